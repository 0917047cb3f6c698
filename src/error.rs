//! Rich diagnostic error types for the chaff engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so embedders know exactly what went wrong
//! and how to fix the calling code.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the chaff engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the embedder.
#[derive(Debug, Error, Diagnostic)]
pub enum ChaffError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Process(#[from] ProcessError),
}

/// Convenience alias used throughout the crate.
pub type ChaffResult<T> = Result<T, ChaffError>;

// ---------------------------------------------------------------------------
// Configuration / request validation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("no combination algorithm configured")]
    #[diagnostic(
        code(chaff::config::no_algorithms),
        help(
            "At least one of the five combination algorithms must be enabled. \
             Set one of the flags in `ClassifierConfig::algorithms`, or use \
             `AlgorithmSet::default()`."
        )
    )]
    NoAlgorithms,

    #[error("classification supplied without a training source")]
    #[diagnostic(
        code(chaff::config::classification_without_source),
        help(
            "A forced classification must say where it came from. Set \
             `ClassifyRequest::source` to Error, Corpus or Inoculation."
        )
    )]
    ClassificationWithoutSource,

    #[error("training source supplied without a classification")]
    #[diagnostic(
        code(chaff::config::source_without_classification),
        help(
            "A training source is only meaningful together with a forced \
             classification. Set `ClassifyRequest::classification`."
        )
    )]
    SourceWithoutClassification,

    #[error("classify-only mode cannot take a forced classification")]
    #[diagnostic(
        code(chaff::config::classify_with_classification),
        help(
            "`OperatingMode::Classify` never trains, so a forced classification \
             would be silently ignored. Use `OperatingMode::Process` to train."
        )
    )]
    ClassifyWithClassification,

    #[error("signature processing requested but no signature was provided")]
    #[diagnostic(
        code(chaff::config::missing_signature),
        help(
            "Retraining from a signature requires `ClassifyRequest::signature` \
             to carry the signature returned by the original pass."
        )
    )]
    MissingSignature,

    #[error("signature has the wrong form for the configured tokenizer")]
    #[diagnostic(
        code(chaff::config::signature_form),
        help(
            "Word tokenizers produce token-entry signatures; the SBPH tokenizer \
             produces text signatures. The supplied signature was produced under \
             a different tokenizer configuration."
        )
    )]
    SignatureForm,
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StorageError {
    #[error("bulk token read failed: {message}")]
    #[diagnostic(
        code(chaff::storage::read),
        help(
            "The storage backend could not deliver token records. The pass \
             continues with zeroed statistics; check the backend's own logs."
        )
    )]
    ReadFailed { message: String },

    #[error("token write failed: {message}")]
    #[diagnostic(
        code(chaff::storage::write),
        help(
            "The storage backend rejected a statistics update. Learned totals \
             in memory were already advanced and are not rolled back."
        )
    )]
    WriteFailed { message: String },

    #[error("signature {id} not found")]
    #[diagnostic(
        code(chaff::storage::signature_not_found),
        help("The signature may have been pruned. Retrain from the original message instead.")
    )]
    SignatureNotFound { id: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(chaff::storage::serialization),
        help(
            "The signature blob could not be encoded or decoded. It may be \
             truncated or from an incompatible version."
        )
    )]
    Serialization { message: String },
}

// ---------------------------------------------------------------------------
// Processing errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ProcessError {
    #[error("no usable tokens found in message")]
    #[diagnostic(
        code(chaff::process::no_signal),
        help(
            "The message produced zero rankable tokens. It may be empty, or \
             every token may have been eliminated as noise."
        )
    )]
    NoSignal,
}
