//! In-memory storage backed by DashMap.
//!
//! The fastest possible backend: concurrent hashmaps for records and
//! signatures, a lock-protected totals block. All data is lost on process
//! exit, which makes it the backend of choice for tests and for embedders
//! that persist through their own means.

use std::collections::HashMap;
use std::sync::RwLock;

use dashmap::DashMap;

use crate::error::StorageError;
use crate::store::{StoreResult, TokenRecord, TokenStore, Totals};

/// Concurrent in-memory store using sharded hashmaps.
#[derive(Debug, Default)]
pub struct MemStore {
    records: DashMap<u64, TokenRecord>,
    totals: RwLock<Totals>,
    signatures: DashMap<String, Vec<u8>>,
}

impl MemStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with pre-allocated record capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: DashMap::with_capacity(capacity),
            totals: RwLock::new(Totals::default()),
            signatures: DashMap::new(),
        }
    }

    /// Number of token records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no token records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn totals_read(&self) -> StoreResult<Totals> {
        self.totals
            .read()
            .map(|guard| *guard)
            .map_err(|_| StorageError::ReadFailed {
                message: "totals lock poisoned".into(),
            })
    }
}

impl TokenStore for MemStore {
    fn get_all_records(&self, keys: &[u64]) -> StoreResult<HashMap<u64, TokenRecord>> {
        let mut found = HashMap::with_capacity(keys.len());
        for &key in keys {
            if let Some(record) = self.records.get(&key) {
                found.insert(key, *record.value());
            }
        }
        Ok(found)
    }

    fn set_all_records(&self, records: &[(u64, TokenRecord)]) -> StoreResult<()> {
        for &(key, record) in records {
            self.records.insert(key, record);
        }
        Ok(())
    }

    fn get_record(&self, key: u64) -> StoreResult<Option<TokenRecord>> {
        Ok(self.records.get(&key).map(|r| *r.value()))
    }

    fn set_record(&self, key: u64, record: &TokenRecord) -> StoreResult<()> {
        self.records.insert(key, *record);
        Ok(())
    }

    fn get_totals(&self) -> StoreResult<Totals> {
        self.totals_read()
    }

    fn set_totals(&self, totals: &Totals) -> StoreResult<()> {
        match self.totals.write() {
            Ok(mut guard) => {
                *guard = *totals;
                Ok(())
            }
            Err(_) => Err(StorageError::WriteFailed {
                message: "totals lock poisoned".into(),
            }),
        }
    }

    fn get_signature(&self, id: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.signatures.get(id).map(|s| s.value().clone()))
    }

    fn set_signature(&self, id: &str, data: &[u8]) -> StoreResult<()> {
        self.signatures.insert(id.to_owned(), data.to_vec());
        Ok(())
    }

    fn delete_signature(&self, id: &str) -> StoreResult<()> {
        self.signatures.remove(id);
        Ok(())
    }

    fn verify_signature(&self, id: &str) -> StoreResult<bool> {
        Ok(self.signatures.contains_key(id))
    }

    fn token_records(&self) -> StoreResult<Vec<(u64, TokenRecord)>> {
        Ok(self
            .records
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect())
    }

    fn signature_ids(&self) -> StoreResult<Vec<String>> {
        Ok(self.signatures.iter().map(|e| e.key().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_roundtrip() {
        let store = MemStore::new();
        let record = TokenRecord {
            spam_hits: 3,
            innocent_hits: 1,
        };
        store.set_record(42, &record).unwrap();
        assert_eq!(store.get_record(42).unwrap(), Some(record));
        assert_eq!(store.get_record(43).unwrap(), None);
    }

    #[test]
    fn bulk_read_returns_only_present_keys() {
        let store = MemStore::new();
        store
            .set_all_records(&[
                (1, TokenRecord { spam_hits: 1, innocent_hits: 0 }),
                (2, TokenRecord { spam_hits: 0, innocent_hits: 5 }),
            ])
            .unwrap();
        let found = store.get_all_records(&[1, 2, 3]).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.contains_key(&1));
        assert!(!found.contains_key(&3));
    }

    #[test]
    fn totals_roundtrip() {
        let store = MemStore::new();
        assert_eq!(store.get_totals().unwrap(), Totals::default());
        let totals = Totals {
            spam_learned: 10,
            innocent_learned: 20,
            ..Totals::default()
        };
        store.set_totals(&totals).unwrap();
        assert_eq!(store.get_totals().unwrap(), totals);
    }

    #[test]
    fn signatures_roundtrip() {
        let store = MemStore::new();
        store.set_signature("msg-1", &[1, 2, 3]).unwrap();
        assert!(store.verify_signature("msg-1").unwrap());
        assert_eq!(store.get_signature("msg-1").unwrap(), Some(vec![1, 2, 3]));
        store.delete_signature("msg-1").unwrap();
        assert!(!store.verify_signature("msg-1").unwrap());
        // deleting again is fine
        store.delete_signature("msg-1").unwrap();
    }

    #[test]
    fn concurrent_access() {
        use std::sync::Arc;
        let store = Arc::new(MemStore::new());
        let handles: Vec<_> = (0..100u64)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let record = TokenRecord {
                        spam_hits: i,
                        innocent_hits: 0,
                    };
                    store.set_record(i, &record).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 100);
    }
}
