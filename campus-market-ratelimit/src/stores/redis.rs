//! Redis ledger store
//!
//! Keeps the serialized ledger as a plain string value at
//! `<prefix>:<storage key>`. Requires the `redis` feature to be enabled.

use crate::error::{RateLimitError, RateLimitResult};
use crate::ledger::Ledger;
use crate::stores::LedgerStore;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, trace};

/// Redis-backed ledger store
pub struct RedisStore {
    /// Redis connection manager
    conn: ConnectionManager,
    /// Key prefix
    prefix: String,
}

impl RedisStore {
    /// Create a new Redis store
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://localhost:6379")
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn new(url: &str) -> RateLimitResult<Self> {
        debug!(url = %url, "Connecting to Redis for ledger storage");

        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self {
            conn,
            prefix: "campus_market".to_string(),
        })
    }

    /// Create a new Redis store with a custom prefix
    pub async fn with_prefix(url: &str, prefix: impl Into<String>) -> RateLimitResult<Self> {
        let mut store = Self::new(url).await?;
        store.prefix = prefix.into();
        Ok(store)
    }

    /// Get the full key with prefix
    fn key(&self, storage_key: &str) -> String {
        format!("{}:{}", self.prefix, storage_key)
    }
}

#[async_trait]
impl LedgerStore for RedisStore {
    async fn load(&self, storage_key: &str) -> RateLimitResult<Ledger> {
        let full_key = self.key(storage_key);
        trace!(key = %full_key, "Loading ledger from Redis");

        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(&full_key)
            .await
            .map_err(|e| RateLimitError::store(e.to_string()))?;

        match raw {
            Some(raw) => Ledger::from_json(&raw),
            None => Ok(Ledger::default()),
        }
    }

    async fn save(&self, storage_key: &str, ledger: &Ledger) -> RateLimitResult<()> {
        let full_key = self.key(storage_key);
        let json = ledger.to_json()?;
        trace!(key = %full_key, entries = ledger.len(), "Saving ledger to Redis");

        let mut conn = self.conn.clone();
        let _: () = conn
            .set(&full_key, json)
            .await
            .map_err(|e| RateLimitError::store(e.to_string()))?;
        Ok(())
    }

    async fn clear(&self, storage_key: &str) -> RateLimitResult<()> {
        let full_key = self.key(storage_key);
        debug!(key = %full_key, "Clearing ledger in Redis");

        let mut conn = self.conn.clone();
        let _: () = conn
            .del(&full_key)
            .await
            .map_err(|e| RateLimitError::store(e.to_string()))?;
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "redis"
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("prefix", &self.prefix)
            .finish()
    }
}
