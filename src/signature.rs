//! Binary training signatures.
//!
//! A signature captures what a pass learned so the decision can be exactly
//! retrained or reversed later without the original message. Word
//! tokenizers record the token keys and their message-local frequencies;
//! the sparse tokenizer records the degenerated text itself, since its
//! window patterns cannot be replayed from keys alone.

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// One learned token: key plus how often it appeared in the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub key: u64,
    pub frequency: i64,
}

/// A training signature in one of its two forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Signature {
    /// Token/frequency entries, produced by the word tokenizers.
    Tokens(Vec<SignatureEntry>),
    /// The degenerated message text, produced under SBPH so retraining can
    /// re-run the window tokenizer.
    Text { headers: String, body: String },
}

impl Signature {
    /// Encode for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        bincode::serialize(self).map_err(|e| StorageError::Serialization {
            message: format!("failed to encode signature: {e}"),
        })
    }

    /// Decode a stored signature.
    pub fn from_bytes(data: &[u8]) -> Result<Self, StorageError> {
        bincode::deserialize(data).map_err(|e| StorageError::Serialization {
            message: format!("failed to decode signature: {e}"),
        })
    }
}
