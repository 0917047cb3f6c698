//! Storage abstraction for token statistics, totals and signatures.
//!
//! The engine talks to persistence through the [`TokenStore`] trait, scoped
//! to a single user's data. Backends decide everything else: durability,
//! sharing, pruning policy. [`mem::MemStore`] is the bundled in-memory
//! backend.

pub mod mem;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result alias for storage operations.
pub type StoreResult<T> = Result<T, StorageError>;

/// Persistent per-token hit counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub spam_hits: u64,
    pub innocent_hits: u64,
}

/// Per-user message counters.
///
/// `*_learned` move with training and unlearning; `*_misclassified` and
/// `*_corpusfed` record why; `*_classified` count classify-only passes in
/// train-on-error mode so sedation sees the real corpus size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub spam_learned: u64,
    pub innocent_learned: u64,
    pub spam_misclassified: u64,
    pub innocent_misclassified: u64,
    pub spam_corpusfed: u64,
    pub innocent_corpusfed: u64,
    pub spam_classified: u64,
    pub innocent_classified: u64,
}

/// Capability contract a storage backend must provide.
///
/// Bulk reads return only the keys that exist; the engine treats absence
/// as a zeroed record. Writes replace whole records. Signatures are opaque
/// blobs keyed by caller-chosen identifiers.
pub trait TokenStore: Send + Sync {
    /// Fetch records for every key that exists in storage.
    fn get_all_records(&self, keys: &[u64]) -> StoreResult<HashMap<u64, TokenRecord>>;

    /// Write (or overwrite) a batch of records.
    fn set_all_records(&self, records: &[(u64, TokenRecord)]) -> StoreResult<()>;

    /// Fetch a single record.
    fn get_record(&self, key: u64) -> StoreResult<Option<TokenRecord>>;

    /// Write a single record.
    fn set_record(&self, key: u64, record: &TokenRecord) -> StoreResult<()>;

    /// Load the user's totals. A fresh user has all-zero totals.
    fn get_totals(&self) -> StoreResult<Totals>;

    /// Persist the user's totals.
    fn set_totals(&self, totals: &Totals) -> StoreResult<()>;

    /// Fetch a stored signature blob.
    fn get_signature(&self, id: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store a signature blob under `id`.
    fn set_signature(&self, id: &str, data: &[u8]) -> StoreResult<()>;

    /// Delete a stored signature. Deleting a missing signature is not an
    /// error.
    fn delete_signature(&self, id: &str) -> StoreResult<()>;

    /// Whether a signature exists without fetching it.
    fn verify_signature(&self, id: &str) -> StoreResult<bool>;

    /// Snapshot of all token records, for maintenance tooling.
    fn token_records(&self) -> StoreResult<Vec<(u64, TokenRecord)>>;

    /// Snapshot of all stored signature identifiers.
    fn signature_ids(&self) -> StoreResult<Vec<String>>;
}
