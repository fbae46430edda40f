//! Rate limiter configuration and builder

use crate::RateLimiter;
use crate::clock::{Clock, SystemClock, duration_ms};
use crate::error::{RateLimitError, RateLimitResult};
use crate::stores::{FileStore, LedgerStore, MemoryStore, StoreType};
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Storage identifier the ledger is kept under unless overridden
pub const DEFAULT_STORAGE_KEY: &str = "rate_limits";

/// Directory used by the file store unless overridden
pub const DEFAULT_FILE_DIR: &str = "./data/ratelimit";

/// Limits for one kind of operation
///
/// Supplied by the caller on every check and never persisted, so a single
/// limiter can enforce different policies for different keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Attempts permitted inside the window before blocking
    pub max_attempts: u32,
    /// Sliding window length
    pub window: Duration,
    /// Block length after a violation; defaults to `window`
    pub block_duration: Option<Duration>,
    /// Escalating block lengths keyed by escalation count
    pub progressive_blocking: Option<BTreeMap<u32, Duration>>,
}

impl RateLimitConfig {
    /// Create a policy blocking for one window after `max_attempts`
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            block_duration: None,
            progressive_blocking: None,
        }
    }

    /// Set a flat block duration
    pub fn with_block_duration(mut self, duration: Duration) -> Self {
        self.block_duration = Some(duration);
        self
    }

    /// Add one progressive tier
    pub fn with_progressive_tier(mut self, threshold: u32, duration: Duration) -> Self {
        self.progressive_blocking
            .get_or_insert_with(BTreeMap::new)
            .insert(threshold, duration);
        self
    }

    /// Replace all progressive tiers
    pub fn with_progressive_blocking(
        mut self,
        tiers: impl IntoIterator<Item = (u32, Duration)>,
    ) -> Self {
        let tiers: BTreeMap<u32, Duration> = tiers.into_iter().collect();
        self.progressive_blocking = if tiers.is_empty() { None } else { Some(tiers) };
        self
    }

    /// Window length in milliseconds
    pub fn window_ms(&self) -> u64 {
        duration_ms(self.window)
    }

    /// Block length in milliseconds for a violation at `escalation_count`
    ///
    /// Uses the tier with the highest threshold not above the count, falling
    /// back to `block_duration` and then to `window`.
    pub fn block_ms_for(&self, escalation_count: u64) -> u64 {
        let count = u32::try_from(escalation_count).unwrap_or(u32::MAX);
        let tier = self
            .progressive_blocking
            .as_ref()
            .and_then(|tiers| tiers.range(..=count).next_back())
            .map(|(_, duration)| *duration);

        duration_ms(tier.or(self.block_duration).unwrap_or(self.window))
    }

    /// Reject policies that could never allow or never expire
    pub fn validate(&self) -> RateLimitResult<()> {
        if self.max_attempts == 0 {
            return Err(RateLimitError::config(
                "max_attempts must be greater than 0",
            ));
        }
        if self.window.is_zero() {
            return Err(RateLimitError::config("window must be non-zero"));
        }
        if self.block_duration.is_some_and(|d| d.is_zero()) {
            return Err(RateLimitError::config("block duration must be non-zero"));
        }
        if let Some(tiers) = &self.progressive_blocking {
            for (threshold, duration) in tiers {
                if *threshold <= self.max_attempts {
                    return Err(RateLimitError::config(format!(
                        "progressive threshold {} must exceed max_attempts ({})",
                        threshold, self.max_attempts
                    )));
                }
                if duration.is_zero() {
                    return Err(RateLimitError::config(format!(
                        "progressive block for threshold {} must be non-zero",
                        threshold
                    )));
                }
            }
        }
        Ok(())
    }

    /// Human-readable summary, used in logs
    pub fn description(&self) -> String {
        let tiers = self
            .progressive_blocking
            .as_ref()
            .map(|t| format!(", {} progressive tier(s)", t.len()))
            .unwrap_or_default();
        format!(
            "{} attempts per {:?}, block {:?}{}",
            self.max_attempts,
            self.window,
            self.block_duration.unwrap_or(self.window),
            tiers
        )
    }
}

/// Environment-driven limiter settings
///
/// | Variable | Meaning | Default |
/// |---|---|---|
/// | `CAMPUS_MARKET_RATELIMIT_STORE` | `memory`, `file` or `redis` | `memory` |
/// | `CAMPUS_MARKET_RATELIMIT_PATH` | file store directory | `./data/ratelimit` |
/// | `CAMPUS_MARKET_RATELIMIT_REDIS_URL` | Redis URL | unset |
/// | `CAMPUS_MARKET_RATELIMIT_KEY` | storage identifier | `rate_limits` |
/// | `CAMPUS_MARKET_RATELIMIT_FAIL_OPEN` | `1`/`true` or `0`/`false` | `true` |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterSettings {
    /// Which backend to persist the ledger in
    pub store_type: StoreType,
    /// Directory for the file store
    pub file_dir: PathBuf,
    /// Connection URL for the Redis store
    pub redis_url: Option<String>,
    /// Storage identifier for the ledger blob
    pub storage_key: String,
    /// Keep limiting with an empty ledger when storage fails
    pub fail_open: bool,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            store_type: StoreType::Memory,
            file_dir: PathBuf::from(DEFAULT_FILE_DIR),
            redis_url: None,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            fail_open: true,
        }
    }
}

impl LimiterSettings {
    /// Read settings from the process environment
    pub fn from_env() -> RateLimitResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> RateLimitResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let store_type = match lookup("CAMPUS_MARKET_RATELIMIT_STORE") {
            Some(name) => StoreType::from_name(&name).ok_or_else(|| {
                RateLimitError::config(format!("unknown rate limit store: {}", name))
            })?,
            None => defaults.store_type,
        };

        let file_dir = lookup("CAMPUS_MARKET_RATELIMIT_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.file_dir);

        let redis_url = lookup("CAMPUS_MARKET_RATELIMIT_REDIS_URL").filter(|u| !u.is_empty());

        let storage_key = lookup("CAMPUS_MARKET_RATELIMIT_KEY")
            .filter(|k| !k.is_empty())
            .unwrap_or(defaults.storage_key);

        let fail_open = lookup("CAMPUS_MARKET_RATELIMIT_FAIL_OPEN")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(defaults.fail_open);

        Ok(Self {
            store_type,
            file_dir,
            redis_url,
            storage_key,
            fail_open,
        })
    }
}

/// Builder for creating a RateLimiter
pub struct RateLimiterBuilder {
    store: Option<Arc<dyn LedgerStore>>,
    store_type: StoreType,
    file_dir: PathBuf,
    #[cfg(feature = "redis")]
    redis_url: Option<String>,
    storage_key: String,
    clock: Option<Arc<dyn Clock>>,
    fail_open: bool,
}

impl RateLimiterBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::from_settings(&LimiterSettings::default())
    }

    /// Create a builder from environment-style settings
    pub fn from_settings(settings: &LimiterSettings) -> Self {
        Self {
            store: None,
            store_type: settings.store_type.clone(),
            file_dir: settings.file_dir.clone(),
            #[cfg(feature = "redis")]
            redis_url: settings.redis_url.clone(),
            storage_key: settings.storage_key.clone(),
            clock: None,
            fail_open: settings.fail_open,
        }
    }

    /// Use an already constructed store
    pub fn store(mut self, store: Arc<dyn LedgerStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use in-memory store (default)
    pub fn memory_store(mut self) -> Self {
        self.store_type = StoreType::Memory;
        self
    }

    /// Persist the ledger as a JSON file under `dir`
    pub fn file_store(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_type = StoreType::File;
        self.file_dir = dir.into();
        self
    }

    /// Use Redis store
    #[cfg(feature = "redis")]
    pub fn redis_store(mut self, url: &str) -> Self {
        self.store_type = StoreType::Redis;
        self.redis_url = Some(url.to_string());
        self
    }

    /// Set the storage identifier the ledger is kept under
    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Use a custom clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Keep limiting with an empty ledger when storage fails
    pub fn fail_open(mut self, fail_open: bool) -> Self {
        self.fail_open = fail_open;
        self
    }

    /// Build the rate limiter
    pub async fn build(self) -> RateLimitResult<RateLimiter> {
        if self.storage_key.is_empty() {
            return Err(RateLimitError::config("storage key must not be empty"));
        }

        debug!(
            store_type = ?self.store_type,
            storage_key = %self.storage_key,
            fail_open = self.fail_open,
            "Building rate limiter"
        );

        let store: Arc<dyn LedgerStore> = match (self.store, &self.store_type) {
            (Some(store), _) => store,
            (None, StoreType::Memory) => Arc::new(MemoryStore::new()),
            (None, StoreType::File) => Arc::new(FileStore::new(&self.file_dir).await?),
            #[cfg(feature = "redis")]
            (None, StoreType::Redis) => {
                let url = self.redis_url.ok_or_else(|| {
                    RateLimitError::config("Redis URL must be specified for Redis store")
                })?;
                Arc::new(crate::stores::RedisStore::new(&url).await?)
            }
            #[cfg(not(feature = "redis"))]
            (None, StoreType::Redis) => {
                return Err(RateLimitError::config(
                    "Redis feature is not enabled. Add `redis` feature to use Redis store.",
                ));
            }
        };

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        Ok(RateLimiter::new(
            store,
            clock,
            self.storage_key,
            self.fail_open,
        ))
    }
}

impl Default for RateLimiterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
