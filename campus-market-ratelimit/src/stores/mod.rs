//! Ledger storage backends
//!
//! The limiter persists its whole ledger as one serialized blob under a single
//! storage identifier. Backends only move that blob around:
//!
//! - **Memory**: DashMap of storage identifier to blob (default, tests)
//! - **File**: one JSON file per storage identifier, replaced atomically
//! - **Redis**: one string value per storage identifier

mod file;
mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis::RedisStore;

use crate::error::RateLimitResult;
use crate::ledger::Ledger;
use async_trait::async_trait;

/// Store type for the ledger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StoreType {
    /// In-memory store (lost on restart)
    #[default]
    Memory,
    /// JSON file on local disk
    File,
    /// Redis store
    Redis,
}

impl StoreType {
    /// Parse a store name as used in settings
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "memory" | "mem" => Some(StoreType::Memory),
            "file" | "fs" => Some(StoreType::File),
            "redis" => Some(StoreType::Redis),
            _ => None,
        }
    }
}

/// Trait for ledger storage backends
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Read the ledger stored under `storage_key`
    ///
    /// A missing blob is an empty ledger. An unreadable blob is
    /// [`RateLimitError::CorruptLedger`](crate::RateLimitError::CorruptLedger).
    async fn load(&self, storage_key: &str) -> RateLimitResult<Ledger>;

    /// Replace the ledger stored under `storage_key`
    async fn save(&self, storage_key: &str, ledger: &Ledger) -> RateLimitResult<()>;

    /// Remove the ledger stored under `storage_key`
    async fn clear(&self, storage_key: &str) -> RateLimitResult<()>;

    /// Get store type name for debugging
    fn store_type(&self) -> &'static str;
}
