//! Persisted attempt ledger
//!
//! The whole ledger is one JSON object keyed by operation key and is always
//! read and written as a unit:
//!
//! ```json
//! {
//!   "login_failed_x@y.edu": { "attempts": [1700000000000], "blockedUntil": 1700001800000 }
//! }
//! ```

use crate::error::{RateLimitError, RateLimitResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Attempt history and block state for a single operation key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitEntry {
    /// Attempt timestamps (ms since epoch), oldest first
    #[serde(default)]
    pub attempts: VecDeque<u64>,
    /// Key is blocked until this timestamp (ms since epoch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_until: Option<u64>,
    /// Violations recorded since the entry was created or reset
    #[serde(default, skip_serializing_if = "is_zero")]
    pub violations: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl RateLimitEntry {
    /// Whether a block is in force at `now`
    pub fn is_blocked(&self, now: u64) -> bool {
        self.blocked_until.is_some_and(|until| until > now)
    }

    /// Time left on the current block, if any
    pub fn block_remaining_ms(&self, now: u64) -> Option<u64> {
        self.blocked_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Whether a block was set and has since run out
    pub fn block_expired(&self, now: u64) -> bool {
        self.blocked_until.is_some_and(|until| until <= now)
    }

    /// Drop attempts that fell out of the window
    pub fn prune(&mut self, now: u64, window_ms: u64) {
        self.attempts.retain(|&t| now.saturating_sub(t) < window_ms);
    }

    /// Number of attempts inside the window, without mutating the entry
    pub fn recent_attempts(&self, now: u64, window_ms: u64) -> usize {
        self.attempts
            .iter()
            .filter(|&&t| now.saturating_sub(t) < window_ms)
            .count()
    }

    /// Most recent recorded attempt
    pub fn last_attempt(&self) -> Option<u64> {
        self.attempts.iter().copied().max()
    }
}

/// All entries, keyed by operation key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    entries: BTreeMap<String, RateLimitEntry>,
}

impl Ledger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a stored ledger. Blank input is an empty ledger.
    pub fn from_json(raw: &str) -> RateLimitResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw).map_err(|e| RateLimitError::corrupt(e.to_string()))
    }

    /// Encode the ledger for storage
    pub fn to_json(&self) -> RateLimitResult<String> {
        serde_json::to_string(self).map_err(|e| RateLimitError::Serialization(e.to_string()))
    }

    /// Look up an entry
    pub fn get(&self, key: &str) -> Option<&RateLimitEntry> {
        self.entries.get(key)
    }

    /// Fetch or lazily create the entry for `key`
    pub fn entry_mut(&mut self, key: &str) -> &mut RateLimitEntry {
        self.entries.entry(key.to_string()).or_default()
    }

    /// Replace the entry for `key`
    pub fn insert(&mut self, key: impl Into<String>, entry: RateLimitEntry) {
        self.entries.insert(key.into(), entry);
    }

    /// Remove an entry, returning it if present
    pub fn remove(&mut self, key: &str) -> Option<RateLimitEntry> {
        self.entries.remove(key)
    }

    /// Keep only the entries matching `keep`
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str, &RateLimitEntry) -> bool,
    {
        self.entries.retain(|k, v| keep(k, v));
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no keys are tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_drops_stale_attempts() {
        let mut entry = RateLimitEntry {
            attempts: VecDeque::from([0, 1_500]),
            ..Default::default()
        };

        entry.prune(2_000, 1_000);
        assert_eq!(entry.attempts, VecDeque::from([1_500]));
    }

    #[test]
    fn test_prune_boundary_is_exclusive() {
        let mut entry = RateLimitEntry {
            attempts: VecDeque::from([1_000]),
            ..Default::default()
        };

        // Exactly one window old no longer counts
        entry.prune(2_000, 1_000);
        assert!(entry.attempts.is_empty());
    }

    #[test]
    fn test_block_state() {
        let entry = RateLimitEntry {
            blocked_until: Some(5_000),
            ..Default::default()
        };

        assert!(entry.is_blocked(4_999));
        assert_eq!(entry.block_remaining_ms(4_000), Some(1_000));
        assert!(!entry.is_blocked(5_000));
        assert!(entry.block_expired(5_000));
        assert_eq!(entry.block_remaining_ms(5_000), None);
    }

    #[test]
    fn test_json_uses_camel_case() {
        let mut ledger = Ledger::new();
        ledger.insert(
            "signup_attempt",
            RateLimitEntry {
                attempts: VecDeque::from([10, 20]),
                blocked_until: Some(99),
                violations: 0,
            },
        );

        let json = ledger.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"signup_attempt":{"attempts":[10,20],"blockedUntil":99}}"#
        );
    }

    #[test]
    fn test_from_json_defaults_missing_fields() {
        let ledger = Ledger::from_json(r#"{"k":{"attempts":[1]}}"#).unwrap();
        let entry = ledger.get("k").unwrap();
        assert_eq!(entry.blocked_until, None);
        assert_eq!(entry.violations, 0);
    }

    #[test]
    fn test_from_json_blank_is_empty() {
        assert!(Ledger::from_json("").unwrap().is_empty());
        assert!(Ledger::from_json("  \n").unwrap().is_empty());
    }

    #[test]
    fn test_from_json_corrupt() {
        let err = Ledger::from_json("{not json").unwrap_err();
        assert!(err.is_corrupt());

        let err = Ledger::from_json(r#"{"k":{"attempts":"nope"}}"#).unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn test_entry_mut_creates_lazily() {
        let mut ledger = Ledger::new();
        assert!(ledger.get("a").is_none());

        ledger.entry_mut("a").attempts.push_back(1);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get("a").unwrap().attempts.len(), 1);

        assert!(ledger.remove("a").is_some());
        assert!(ledger.is_empty());
    }
}
