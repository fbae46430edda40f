//! # Campus Market Rate Limiting
//!
//! Client-side abuse limiter for the marketplace's sensitive operations:
//! login attempts, signup, listing creation, order creation and password
//! reset.
//!
//! ## Features
//!
//! - **Sliding window**: only attempts from the last `window` count
//! - **Lockouts**: saturating the window blocks the key; blocks always win
//! - **Progressive lockouts**: repeat offenders get longer blocks
//! - **Persisted ledger**: survives restarts via memory, file or Redis stores
//! - **Fail-open storage**: an unavailable store never locks users out
//!
//! This limiter is advisory. Anything it guards must also be enforced by the
//! backend.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use campus_market_ratelimit::RateLimiter;
//! use campus_market_ratelimit::policies::OperationKind;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let limiter = RateLimiter::builder()
//!     .file_store("./data/ratelimit")
//!     .build()
//!     .await?;
//!
//! let key = OperationKind::LoginFailed.key("student@campus.edu");
//! let result = limiter
//!     .check_limit(&key, &OperationKind::LoginFailed.config())
//!     .await?;
//! if !result.allowed {
//!     println!("{}", result.message.unwrap_or_default());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Login flow
//!
//! Every real attempt calls [`RateLimiter::check_limit`] exactly once. A
//! failed login records itself by calling `check_limit` on the
//! `login_failed_<email>` key; a successful login calls [`RateLimiter::reset`]
//! on that key.

pub mod algorithms;
pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod policies;
pub mod stores;

pub use algorithms::{Decision, SlidingWindowLog, block_message};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LimiterSettings, RateLimitConfig, RateLimiterBuilder};
pub use error::{RateLimitError, RateLimitResult};
pub use ledger::{Ledger, RateLimitEntry};
pub use policies::{OperationKind, PolicySet};
pub use stores::{FileStore, LedgerStore, MemoryStore, StoreType};

#[cfg(feature = "redis")]
pub use stores::RedisStore;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitCheckResult {
    /// Whether the attempt may proceed
    pub allowed: bool,
    /// Time until the key unblocks (only when denied)
    pub retry_after: Option<Duration>,
    /// Message to show the user (only when denied)
    pub message: Option<String>,
    /// Attempts left in the current window
    pub remaining: u32,
}

impl RateLimitCheckResult {
    /// Create a new allowed result
    pub fn allowed(remaining: u32) -> Self {
        Self {
            allowed: true,
            retry_after: None,
            message: None,
            remaining,
        }
    }

    /// Create a new denied result
    pub fn denied(retry_after_ms: u64) -> Self {
        Self {
            allowed: false,
            retry_after: Some(Duration::from_millis(retry_after_ms)),
            message: Some(block_message(retry_after_ms)),
            remaining: 0,
        }
    }

    /// Retry delay in whole milliseconds
    pub fn retry_after_ms(&self) -> Option<u64> {
        self.retry_after.map(clock::duration_ms)
    }
}

impl From<Decision> for RateLimitCheckResult {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Allowed { remaining } => Self::allowed(remaining),
            Decision::Blocked { retry_after_ms } => Self::denied(retry_after_ms),
            Decision::Violation { block_ms } => Self::denied(block_ms),
        }
    }
}

/// Read-only view of a key under a policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// A block is in force
    pub blocked: bool,
    /// Time until the block lifts
    pub retry_after: Option<Duration>,
    /// Attempts currently inside the window
    pub recent_attempts: u32,
    /// Attempts left before a violation
    pub remaining: u32,
}

/// The main rate limiter
///
/// Every operation is a full load-modify-save of the ledger performed while
/// holding a limiter-wide lock, so concurrent callers sharing one limiter
/// cannot both observe a free slot and under-count a violation.
pub struct RateLimiter {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    storage_key: String,
    fail_open: bool,
    lock: Mutex<()>,
}

impl RateLimiter {
    /// Create a new rate limiter builder
    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder::new()
    }

    /// Create a new rate limiter over an existing store
    pub fn new(
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        storage_key: impl Into<String>,
        fail_open: bool,
    ) -> Self {
        let storage_key = storage_key.into();
        debug!(
            store = store.store_type(),
            storage_key = %storage_key,
            fail_open = fail_open,
            "Creating new rate limiter"
        );
        Self {
            store,
            clock,
            storage_key,
            fail_open,
            lock: Mutex::new(()),
        }
    }

    /// Evaluate one attempt for `key` and record it if allowed
    ///
    /// Denial is a normal result, not an error. Errors are returned only for
    /// an invalid `config`, or for storage failures when the limiter was built
    /// with `fail_open(false)`.
    pub async fn check_limit(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> RateLimitResult<RateLimitCheckResult> {
        config.validate()?;
        trace!(key = %key, "Checking rate limit");

        let _guard = self.lock.lock().await;
        let now = self.clock.now_ms();
        let (mut ledger, persist) = self.load_ledger().await?;

        let decision = SlidingWindowLog::new(config).evaluate(ledger.entry_mut(key), now);

        if decision.mutated() && persist {
            self.save_ledger(&ledger).await?;
        }

        match decision {
            Decision::Allowed { remaining } => {
                debug!(key = %key, remaining = remaining, "Rate limit: attempt allowed");
            }
            Decision::Blocked { retry_after_ms } => {
                debug!(key = %key, retry_after_ms = retry_after_ms, "Rate limit: key blocked");
            }
            Decision::Violation { block_ms } => {
                warn!(
                    key = %key,
                    block_ms = block_ms,
                    policy = %config.description(),
                    "Rate limit exceeded, blocking key"
                );
            }
        }

        Ok(decision.into())
    }

    /// Inspect `key` under `config` without recording an attempt
    pub async fn status(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> RateLimitResult<RateLimitStatus> {
        config.validate()?;

        let _guard = self.lock.lock().await;
        let now = self.clock.now_ms();
        let (ledger, _) = self.load_ledger().await?;

        let window = SlidingWindowLog::new(config);
        let snapshot = match ledger.get(key) {
            Some(entry) => window.snapshot(entry, now),
            None => window.snapshot(&RateLimitEntry::default(), now),
        };

        Ok(RateLimitStatus {
            blocked: snapshot.blocked,
            retry_after: snapshot.retry_after_ms.map(Duration::from_millis),
            recent_attempts: snapshot.recent_attempts,
            remaining: snapshot.remaining,
        })
    }

    /// Forget everything about `key`
    pub async fn reset(&self, key: &str) -> RateLimitResult<()> {
        debug!(key = %key, "Resetting rate limit");

        let _guard = self.lock.lock().await;
        let (mut ledger, persist) = self.load_ledger().await?;

        if ledger.remove(key).is_some() && persist {
            self.save_ledger(&ledger).await?;
        }
        Ok(())
    }

    /// Wipe the whole persisted ledger
    pub async fn clear_all(&self) -> RateLimitResult<()> {
        debug!(storage_key = %self.storage_key, "Clearing all rate limits");

        let _guard = self.lock.lock().await;
        match self.store.clear(&self.storage_key).await {
            Ok(()) => Ok(()),
            Err(e) if self.fail_open => {
                warn!(error = %e, "Failed to clear rate limit ledger");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Drop idle entries, returning how many were removed
    ///
    /// An entry is idle when it is not blocked and its newest attempt is at
    /// least `max_idle` old. Pass the longest window of any policy in use so
    /// no live window is discarded.
    pub async fn cleanup(&self, max_idle: Duration) -> RateLimitResult<usize> {
        let _guard = self.lock.lock().await;
        let now = self.clock.now_ms();
        let max_idle_ms = clock::duration_ms(max_idle);
        let (mut ledger, persist) = self.load_ledger().await?;

        let before = ledger.len();
        ledger.retain(|_, entry| {
            entry.is_blocked(now)
                || entry
                    .last_attempt()
                    .is_some_and(|t| now.saturating_sub(t) < max_idle_ms)
        });
        let removed = before - ledger.len();

        if removed > 0 && persist {
            self.save_ledger(&ledger).await?;
        }

        debug!(removed = removed, remaining = ledger.len(), "Cleanup complete");
        Ok(removed)
    }

    /// Storage identifier the ledger is kept under
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Name of the backing store
    pub fn store_type(&self) -> &'static str {
        self.store.store_type()
    }

    /// Whether storage failures are tolerated
    pub fn is_fail_open(&self) -> bool {
        self.fail_open
    }

    /// Load the ledger, applying the storage failure policy
    ///
    /// The flag is false when the ledger could not be read and was replaced
    /// by an empty one; saving it would overwrite entries we never saw.
    async fn load_ledger(&self) -> RateLimitResult<(Ledger, bool)> {
        match self.store.load(&self.storage_key).await {
            Ok(ledger) => Ok((ledger, true)),
            Err(RateLimitError::CorruptLedger(reason)) => {
                warn!(
                    storage_key = %self.storage_key,
                    reason = %reason,
                    "Corrupt rate limit ledger, starting from empty"
                );
                Ok((Ledger::default(), true))
            }
            Err(e) if self.fail_open => {
                warn!(
                    storage_key = %self.storage_key,
                    error = %e,
                    "Failed to load rate limit ledger, continuing with empty ledger"
                );
                Ok((Ledger::default(), false))
            }
            Err(e) => Err(e),
        }
    }

    async fn save_ledger(&self, ledger: &Ledger) -> RateLimitResult<()> {
        match self.store.save(&self.storage_key, ledger).await {
            Ok(()) => Ok(()),
            Err(e) if self.fail_open => {
                warn!(
                    storage_key = %self.storage_key,
                    error = %e,
                    "Failed to save rate limit ledger"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("store", &self.store.store_type())
            .field("storage_key", &self.storage_key)
            .field("fail_open", &self.fail_open)
            .finish()
    }
}
