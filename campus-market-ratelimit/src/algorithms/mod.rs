//! Rate limiting algorithms
//!
//! The limiter uses a sliding window log with a lockout stage:
//!
//! - **Sliding window**: only attempts from the last `window` count
//! - **Lockout**: saturating the window blocks the key for a block duration
//! - **Progressive lockout**: repeat violations pick longer blocks from a tier table
//!
//! Algorithms operate on a single [`RateLimitEntry`](crate::ledger::RateLimitEntry)
//! and never touch storage; the [`RateLimiter`](crate::RateLimiter) handles
//! loading and persisting the ledger around them.

mod sliding_window;

pub use sliding_window::{SlidingWindowLog, WindowSnapshot};

/// Outcome of evaluating one attempt against an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Attempt recorded; `remaining` slots left in the window
    Allowed {
        /// Attempts still permitted in the current window
        remaining: u32,
    },
    /// Key was already blocked; the entry is untouched
    Blocked {
        /// Milliseconds until the block lifts
        retry_after_ms: u64,
    },
    /// This attempt saturated the window and started a new block
    Violation {
        /// Length of the block that was applied
        block_ms: u64,
    },
}

impl Decision {
    /// Whether the attempt may proceed
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// Whether the entry changed and must be persisted
    pub fn mutated(&self) -> bool {
        !matches!(self, Decision::Blocked { .. })
    }
}

/// User-facing lockout message, rounded up to whole minutes
pub fn block_message(retry_after_ms: u64) -> String {
    let minutes = retry_after_ms.div_ceil(60_000);
    format!(
        "Too many attempts. Please try again in {} minute(s).",
        minutes
    )
}
