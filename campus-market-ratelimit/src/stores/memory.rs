//! In-memory ledger store
//!
//! Keeps serialized ledgers in a DashMap keyed by storage identifier, so it
//! behaves like a browser storage area: clones share state, data is stored as
//! text and can be corrupt. Suitable for single-process use and for tests.

use crate::error::RateLimitResult;
use crate::ledger::Ledger;
use crate::stores::LedgerStore;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// In-memory ledger store
#[derive(Clone, Default)]
pub struct MemoryStore {
    blobs: Arc<DashMap<String, String>>,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        debug!("Creating new in-memory ledger store");
        Self::default()
    }

    /// Store a raw blob, bypassing serialization
    pub fn insert_raw(&self, storage_key: impl Into<String>, raw: impl Into<String>) {
        self.blobs.insert(storage_key.into(), raw.into());
    }

    /// Raw blob stored under `storage_key`
    pub fn raw(&self, storage_key: &str) -> Option<String> {
        self.blobs.get(storage_key).map(|blob| blob.value().clone())
    }

    /// Number of storage identifiers held
    pub fn key_count(&self) -> usize {
        self.blobs.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn load(&self, storage_key: &str) -> RateLimitResult<Ledger> {
        trace!(storage_key = %storage_key, "Loading ledger from memory");
        match self.blobs.get(storage_key) {
            Some(blob) => Ledger::from_json(blob.value()),
            None => Ok(Ledger::default()),
        }
    }

    async fn save(&self, storage_key: &str, ledger: &Ledger) -> RateLimitResult<()> {
        let json = ledger.to_json()?;
        trace!(storage_key = %storage_key, entries = ledger.len(), "Saving ledger to memory");
        self.blobs.insert(storage_key.to_string(), json);
        Ok(())
    }

    async fn clear(&self, storage_key: &str) -> RateLimitResult<()> {
        debug!(storage_key = %storage_key, "Clearing in-memory ledger");
        self.blobs.remove(storage_key);
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::RateLimitEntry;
    use std::collections::VecDeque;

    fn sample_ledger() -> Ledger {
        let mut ledger = Ledger::new();
        ledger.insert(
            "signup_attempt",
            RateLimitEntry {
                attempts: VecDeque::from([1, 2, 3]),
                ..Default::default()
            },
        );
        ledger
    }

    #[tokio::test]
    async fn test_missing_is_empty() {
        let store = MemoryStore::new();
        assert!(store.load("rate_limits").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = MemoryStore::new();
        let ledger = sample_ledger();

        store.save("rate_limits", &ledger).await.unwrap();
        assert_eq!(store.load("rate_limits").await.unwrap(), ledger);
        assert!(store.raw("rate_limits").unwrap().contains("signup_attempt"));
    }

    #[tokio::test]
    async fn test_storage_keys_are_isolated() {
        let store = MemoryStore::new();
        store.save("a", &sample_ledger()).await.unwrap();

        assert!(store.load("b").await.unwrap().is_empty());
        assert_eq!(store.key_count(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_blob() {
        let store = MemoryStore::new();
        store.insert_raw("rate_limits", "][");

        let err = store.load("rate_limits").await.unwrap_err();
        assert!(err.is_corrupt());
    }

    #[tokio::test]
    async fn test_clear() {
        let store = MemoryStore::new();
        store.save("rate_limits", &sample_ledger()).await.unwrap();

        store.clear("rate_limits").await.unwrap();
        assert!(store.load("rate_limits").await.unwrap().is_empty());
        assert_eq!(store.key_count(), 0);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.save("rate_limits", &sample_ledger()).await.unwrap();

        assert_eq!(other.load("rate_limits").await.unwrap().len(), 1);
    }

    #[test]
    fn test_store_type() {
        let store = MemoryStore::new();
        assert_eq!(store.store_type(), "memory");
    }
}
