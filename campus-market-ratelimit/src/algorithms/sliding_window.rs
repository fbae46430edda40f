//! Sliding Window Log Algorithm with lockout
//!
//! ## How It Works
//!
//! 1. If the key is blocked, the attempt is denied and nothing changes
//! 2. A block that has run out is cleared together with the attempt log
//! 3. Timestamps older than the window are removed
//! 4. If the window is already full, this attempt is a violation: the key is
//!    blocked and the violation counter is bumped
//! 5. Otherwise the attempt is logged and allowed
//!
//! The block length for a violation is picked from the progressive tiers using
//! the escalation count `attempts_in_window + 1 + previous_violations`. The
//! first violation therefore always evaluates at `max_attempts + 1`, and each
//! repeat violation since the last reset climbs one tier.
//!
//! ## Example
//!
//! ```rust
//! use campus_market_ratelimit::algorithms::{Decision, SlidingWindowLog};
//! use campus_market_ratelimit::{RateLimitConfig, RateLimitEntry};
//! use std::time::Duration;
//!
//! let config = RateLimitConfig::new(2, Duration::from_secs(60));
//! let window = SlidingWindowLog::new(&config);
//! let mut entry = RateLimitEntry::default();
//!
//! assert!(window.evaluate(&mut entry, 0).is_allowed());
//! assert!(window.evaluate(&mut entry, 1).is_allowed());
//!
//! // Third attempt blocks for one window (the default block duration)
//! assert_eq!(
//!     window.evaluate(&mut entry, 2),
//!     Decision::Violation { block_ms: 60_000 }
//! );
//! ```

use super::Decision;
use crate::config::RateLimitConfig;
use crate::ledger::RateLimitEntry;
use tracing::trace;

/// Read-only view of an entry under a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// A block is in force
    pub blocked: bool,
    /// Milliseconds until the block lifts
    pub retry_after_ms: Option<u64>,
    /// Attempts currently inside the window
    pub recent_attempts: u32,
    /// Attempts the key may still make before a violation
    pub remaining: u32,
}

/// Sliding window log evaluator for one policy
pub struct SlidingWindowLog<'a> {
    config: &'a RateLimitConfig,
}

impl<'a> SlidingWindowLog<'a> {
    /// Create an evaluator for `config`
    pub fn new(config: &'a RateLimitConfig) -> Self {
        Self { config }
    }

    /// Evaluate and record one attempt at `now`
    pub fn evaluate(&self, entry: &mut RateLimitEntry, now: u64) -> Decision {
        if let Some(retry_after_ms) = entry.block_remaining_ms(now) {
            trace!(retry_after_ms = retry_after_ms, "Sliding window: still blocked");
            return Decision::Blocked { retry_after_ms };
        }

        if entry.block_expired(now) {
            trace!("Sliding window: block expired, starting fresh window");
            entry.blocked_until = None;
            entry.attempts.clear();
        }

        entry.prune(now, self.config.window_ms());

        let max_attempts = self.config.max_attempts as usize;
        let count = entry.attempts.len();

        if count >= max_attempts {
            let escalation = count as u64 + 1 + u64::from(entry.violations);
            let block_ms = self.config.block_ms_for(escalation);
            entry.blocked_until = Some(now.saturating_add(block_ms));
            entry.violations = entry.violations.saturating_add(1);
            trace!(
                escalation = escalation,
                block_ms = block_ms,
                "Sliding window: violation"
            );
            return Decision::Violation { block_ms };
        }

        entry.attempts.push_back(now);
        let remaining = (max_attempts - count - 1) as u32;
        trace!(remaining = remaining, "Sliding window: allowed");
        Decision::Allowed { remaining }
    }

    /// Describe the entry at `now` without recording anything
    pub fn snapshot(&self, entry: &RateLimitEntry, now: u64) -> WindowSnapshot {
        let recent = if entry.block_expired(now) {
            0
        } else {
            entry.recent_attempts(now, self.config.window_ms())
        };
        let recent_attempts = u32::try_from(recent).unwrap_or(u32::MAX);

        match entry.block_remaining_ms(now) {
            Some(retry_after_ms) => WindowSnapshot {
                blocked: true,
                retry_after_ms: Some(retry_after_ms),
                recent_attempts,
                remaining: 0,
            },
            None => WindowSnapshot {
                blocked: false,
                retry_after_ms: None,
                recent_attempts,
                remaining: self.config.max_attempts.saturating_sub(recent_attempts),
            },
        }
    }
}
