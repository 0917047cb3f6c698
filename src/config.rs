//! Classifier configuration: modes, flags and tunables.
//!
//! All knobs live on [`ClassifierConfig`], which is owned by a
//! [`Classifier`](crate::engine::Classifier) instance. There is no global
//! state; two classifiers with different configurations can coexist in one
//! process.

use serde::{Deserialize, Serialize};

/// What a pass is allowed to do with the statistics store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    /// Classify and (depending on the training mode) learn.
    Process,
    /// Classify only. Never writes token statistics or totals.
    Classify,
}

/// When token statistics are updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingMode {
    /// Train on every message.
    Teft,
    /// Train on error: learn only from corrections and inoculations.
    Toe,
    /// Train until mature: like TEFT, but stops reinforcing well-known tokens.
    Tum,
    /// Compute everything, persist nothing.
    NoTrain,
}

/// Tokenization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerKind {
    /// Individual words, scoped by header field.
    Word,
    /// Words plus adjacent-word chains.
    Chain,
    /// Sparse binary polynomial hashing: every subset of a sliding window.
    Sbph,
    /// Orthogonal sparse bigrams: two-term window subsets only.
    Osb,
}

/// How per-token probabilities are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PValuePolicy {
    /// Graham's estimate with innocent hits counted twice.
    Graham,
    /// Graham's estimate plus Robinson shrinkage toward 0.5.
    Robinson,
    /// Markovian weighting by token complexity and sparseness.
    Markov,
}

/// Which combination algorithms run over the ranked tokens.
///
/// At least one must be enabled; [`Classifier::new`](crate::engine::Classifier::new)
/// rejects an empty set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgorithmSet {
    pub naive: bool,
    pub graham: bool,
    pub burton: bool,
    pub robinson: bool,
    pub chi_square: bool,
}

impl AlgorithmSet {
    /// Graham plus Burton, the classic dual-Bayesian arrangement.
    pub fn bayesian() -> Self {
        Self {
            naive: false,
            graham: true,
            burton: true,
            robinson: false,
            chi_square: false,
        }
    }

    /// Only Fisher-Robinson inverse chi-square.
    pub fn chi_square() -> Self {
        Self {
            naive: false,
            graham: false,
            burton: false,
            robinson: false,
            chi_square: true,
        }
    }

    /// Only Robinson's geometric mean.
    pub fn robinson() -> Self {
        Self {
            naive: false,
            graham: false,
            burton: false,
            robinson: true,
            chi_square: false,
        }
    }

    /// Whether any algorithm is enabled.
    pub fn any(&self) -> bool {
        self.naive || self.graham || self.burton || self.robinson || self.chi_square
    }
}

impl Default for AlgorithmSet {
    /// Graham + Burton with chi-square, a common production arrangement.
    fn default() -> Self {
        Self {
            naive: false,
            graham: true,
            burton: true,
            robinson: false,
            chi_square: true,
        }
    }
}

/// A verdict, or a caller-asserted truth about a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Class {
    Spam,
    Innocent,
}

/// Where a forced classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingSource {
    /// A user correction of an earlier verdict.
    Error,
    /// Corpus feeding: bulk training from a pre-sorted mail archive.
    Corpus,
    /// An inoculation: a trusted report of spam never seen by this user.
    Inoculation,
}

/// Configuration for a [`Classifier`](crate::engine::Classifier).
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub mode: OperatingMode,
    pub training: TrainingMode,
    pub tokenizer: TokenizerKind,
    pub algorithms: AlgorithmSet,
    pub pvalue: PValuePolicy,
    /// Produce a training signature so the pass can be retrained later.
    pub make_signature: bool,
    /// Run Bayesian Noise Reduction before ranking.
    pub noise_reduction: bool,
    /// Track the sender line and force innocent verdicts for known senders.
    pub auto_whitelist: bool,
    /// Double-count innocent hits ("bias"), trading accuracy toward
    /// fewer false positives.
    pub bias: bool,
    /// Count repeated token occurrences instead of capping each token at one
    /// hit per message.
    pub count_occurrences: bool,
    /// Extra hits a token must have before it is trusted, 0–10. Scales up
    /// while the account is young.
    pub training_buffer: u8,
    /// Innocent hits a sender token needs before whitelisting can fire.
    pub whitelist_threshold: u64,
    /// Tokenize the contents of URLs into their own `Url*` scope.
    pub url_context: bool,
    /// Header fields whose values are never tokenized.
    pub ignored_headers: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            mode: OperatingMode::Process,
            training: TrainingMode::Teft,
            tokenizer: TokenizerKind::Chain,
            algorithms: AlgorithmSet::default(),
            pvalue: PValuePolicy::Graham,
            make_signature: true,
            noise_reduction: false,
            auto_whitelist: true,
            bias: false,
            count_occurrences: false,
            training_buffer: 5,
            whitelist_threshold: 10,
            url_context: true,
            ignored_headers: Vec::new(),
        }
    }
}

impl ClassifierConfig {
    /// Whether the configured tokenizer emits sparse window patterns.
    pub fn is_sparse(&self) -> bool {
        matches!(self.tokenizer, TokenizerKind::Sbph | TokenizerKind::Osb)
    }

    /// Whether per-token probabilities are Markov-weighted.
    pub fn is_weighted(&self) -> bool {
        self.pvalue == PValuePolicy::Markov
    }
}
