//! Named policies for the marketplace's sensitive operations
//!
//! Call sites pick an [`OperationKind`], build the ledger key with
//! [`OperationKind::key`] and pass the matching config to
//! [`RateLimiter::check_limit`](crate::RateLimiter::check_limit).
//!
//! | Operation | Attempts | Window | Block |
//! |---|---|---|---|
//! | order creation | 10 | 1 min | 5 min |
//! | password reset | 3 | 1 h | 1 h |
//! | listing creation | 5 | 1 h | 1 h |
//! | signup | 3 | 1 h | 24 h |
//! | failed login | 5 | 15 min | 30 min, then 1 h, then 24 h |
//!
//! Deployments can override any row from a TOML or JSON policy file:
//!
//! ```toml
//! [login_failed]
//! max_attempts = 5
//! window_ms = 900000
//! block_duration_ms = 1800000
//! progressive_blocking = [
//!     { threshold = 6, block_ms = 1800000 },
//!     { threshold = 7, block_ms = 3600000 },
//! ]
//! ```

use crate::config::RateLimitConfig;
use crate::error::{RateLimitError, RateLimitResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Order placement: 10 per minute, 5 minute block
pub fn order_creation() -> RateLimitConfig {
    RateLimitConfig::new(10, MINUTE).with_block_duration(5 * MINUTE)
}

/// Password reset emails: 3 per hour, 1 hour block
pub fn password_reset() -> RateLimitConfig {
    RateLimitConfig::new(3, HOUR).with_block_duration(HOUR)
}

/// New listings: 5 per hour, 1 hour block
pub fn listing_creation() -> RateLimitConfig {
    RateLimitConfig::new(5, HOUR).with_block_duration(HOUR)
}

/// Account signup: 3 per hour, 24 hour block
pub fn signup() -> RateLimitConfig {
    RateLimitConfig::new(3, HOUR).with_block_duration(DAY)
}

/// Failed logins: 5 per 15 minutes, lockout escalating 30 min, 1 h, 24 h
pub fn login_failed() -> RateLimitConfig {
    RateLimitConfig::new(5, 15 * MINUTE)
        .with_block_duration(30 * MINUTE)
        .with_progressive_blocking([(6, 30 * MINUTE), (7, HOUR), (8, DAY)])
}

/// Sensitive operations guarded by the limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    /// Placing an order
    OrderCreation,
    /// Requesting a password reset email
    PasswordReset,
    /// Publishing a listing
    ListingCreation,
    /// Creating an account
    Signup,
    /// A login attempt that failed
    LoginFailed,
}

impl OperationKind {
    /// Every operation, in table order
    pub const ALL: [OperationKind; 5] = [
        OperationKind::OrderCreation,
        OperationKind::PasswordReset,
        OperationKind::ListingCreation,
        OperationKind::Signup,
        OperationKind::LoginFailed,
    ];

    /// Name used in policy files
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::OrderCreation => "order_creation",
            OperationKind::PasswordReset => "password_reset",
            OperationKind::ListingCreation => "listing_creation",
            OperationKind::Signup => "signup",
            OperationKind::LoginFailed => "login_failed",
        }
    }

    /// Parse a policy file name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Prefix of ledger keys for this operation
    pub fn key_prefix(&self) -> &'static str {
        match self {
            OperationKind::OrderCreation => "order_create",
            OperationKind::PasswordReset => "password_reset",
            OperationKind::ListingCreation => "listing_create",
            OperationKind::Signup => "signup_attempt",
            OperationKind::LoginFailed => "login_failed",
        }
    }

    /// Ledger key for `subject` (an email or user id); empty means global
    ///
    /// Subjects are trimmed and lower-cased so `X@Y.edu ` and `x@y.edu`
    /// share one ledger entry.
    pub fn key(&self, subject: &str) -> String {
        let subject = subject.trim().to_lowercase();
        if subject.is_empty() {
            self.key_prefix().to_string()
        } else {
            format!("{}_{}", self.key_prefix(), subject)
        }
    }

    /// Built-in policy for this operation
    pub fn config(&self) -> RateLimitConfig {
        match self {
            OperationKind::OrderCreation => order_creation(),
            OperationKind::PasswordReset => password_reset(),
            OperationKind::ListingCreation => listing_creation(),
            OperationKind::Signup => signup(),
            OperationKind::LoginFailed => login_failed(),
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Supported policy file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// `.json` policy file
    Json,
    /// `.toml` policy file
    Toml,
}

impl FileFormat {
    /// Detect the format from a file extension, case-insensitively
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyDef {
    max_attempts: u32,
    window_ms: u64,
    #[serde(default)]
    block_duration_ms: Option<u64>,
    #[serde(default)]
    progressive_blocking: Vec<TierDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TierDef {
    threshold: u32,
    block_ms: u64,
}

impl PolicyDef {
    fn into_config(self) -> RateLimitConfig {
        let window = Duration::from_millis(self.window_ms);
        let mut config = RateLimitConfig::new(self.max_attempts, window);
        if let Some(ms) = self.block_duration_ms {
            config = config.with_block_duration(Duration::from_millis(ms));
        }
        config.with_progressive_blocking(
            self.progressive_blocking
                .into_iter()
                .map(|tier| (tier.threshold, Duration::from_millis(tier.block_ms))),
        )
    }
}

/// Policy per operation, starting from the built-in table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySet {
    policies: HashMap<OperationKind, RateLimitConfig>,
}

impl Default for PolicySet {
    fn default() -> Self {
        Self {
            policies: OperationKind::ALL
                .into_iter()
                .map(|kind| (kind, kind.config()))
                .collect(),
        }
    }
}

impl PolicySet {
    /// Built-in policies
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy for `kind`
    pub fn get(&self, kind: OperationKind) -> &RateLimitConfig {
        // Every kind is populated by Default and `set` only replaces
        &self.policies[&kind]
    }

    /// Replace the policy for `kind` after validating it
    pub fn set(&mut self, kind: OperationKind, config: RateLimitConfig) -> RateLimitResult<()> {
        config.validate()?;
        self.policies.insert(kind, config);
        Ok(())
    }

    /// Built-in policies overridden from a `.toml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> RateLimitResult<Self> {
        let path = path.as_ref();
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(FileFormat::from_extension)
            .ok_or_else(|| {
                RateLimitError::config(format!("Unsupported policy file format: {:?}", path))
            })?;

        let content = fs::read_to_string(path).map_err(|e| {
            RateLimitError::config(format!("Failed to read policy file {:?}: {}", path, e))
        })?;

        debug!(path = ?path, format = ?format, "Loading rate limit policies");
        Self::parse(&content, format)
    }

    /// Built-in policies overridden from file contents
    pub fn parse(content: &str, format: FileFormat) -> RateLimitResult<Self> {
        let defs: HashMap<String, PolicyDef> = match format {
            FileFormat::Json => serde_json::from_str(content).map_err(|e| {
                RateLimitError::config(format!("JSON policy parse error: {}", e))
            })?,
            FileFormat::Toml => toml::from_str(content).map_err(|e| {
                RateLimitError::config(format!("TOML policy parse error: {}", e))
            })?,
        };

        let mut set = Self::default();
        for (name, def) in defs {
            let kind = OperationKind::from_name(&name)
                .ok_or_else(|| RateLimitError::config(format!("Unknown operation: {}", name)))?;
            set.set(kind, def.into_config()).map_err(|e| {
                RateLimitError::config(format!("Invalid policy for {}: {}", name, e))
            })?;
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_policies_are_valid() {
        for kind in OperationKind::ALL {
            assert!(kind.config().validate().is_ok(), "{} is invalid", kind);
        }
    }

    #[test]
    fn test_login_failed_first_lockout_is_30_minutes() {
        let config = login_failed();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.window_ms(), 900_000);
        assert_eq!(config.block_ms_for(6), 1_800_000);
        assert_eq!(config.block_ms_for(7), 3_600_000);
        assert_eq!(config.block_ms_for(8), 86_400_000);
    }

    #[test]
    fn test_keys() {
        assert_eq!(
            OperationKind::LoginFailed.key(" X@Y.edu "),
            "login_failed_x@y.edu"
        );
        assert_eq!(OperationKind::Signup.key(""), "signup_attempt");
        assert_eq!(OperationKind::ListingCreation.key("u1"), "listing_create_u1");
    }

    #[test]
    fn test_names_round_trip() {
        for kind in OperationKind::ALL {
            assert_eq!(OperationKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(OperationKind::from_name("checkout"), None);
    }

    #[test]
    fn test_parse_toml_overrides() {
        let content = r#"
            [signup]
            max_attempts = 10
            window_ms = 60000

            [login_failed]
            max_attempts = 3
            window_ms = 60000
            block_duration_ms = 120000
            progressive_blocking = [
                { threshold = 4, block_ms = 300000 },
                { threshold = 6, block_ms = 1800000 },
            ]
        "#;
        let set = PolicySet::parse(content, FileFormat::Toml).unwrap();

        let signup = set.get(OperationKind::Signup);
        assert_eq!(signup.max_attempts, 10);
        assert_eq!(signup.block_duration, None);

        let login = set.get(OperationKind::LoginFailed);
        assert_eq!(login.block_ms_for(4), 300_000);
        assert_eq!(login.block_ms_for(5), 300_000);
        assert_eq!(login.block_ms_for(6), 1_800_000);

        // Untouched policies keep their defaults
        assert_eq!(set.get(OperationKind::OrderCreation), &order_creation());
    }

    #[test]
    fn test_parse_json() {
        let content = r#"{"password_reset": {"max_attempts": 1, "window_ms": 1000}}"#;
        let set = PolicySet::parse(content, FileFormat::Json).unwrap();
        assert_eq!(set.get(OperationKind::PasswordReset).max_attempts, 1);
    }

    #[test]
    fn test_parse_rejects_unknown_operation() {
        let content = r#"{"checkout": {"max_attempts": 1, "window_ms": 1000}}"#;
        let err = PolicySet::parse(content, FileFormat::Json).unwrap_err();
        assert!(err.to_string().contains("Unknown operation"));
    }

    #[test]
    fn test_parse_rejects_invalid_policy() {
        let content = r#"{"signup": {"max_attempts": 0, "window_ms": 1000}}"#;
        assert!(PolicySet::parse(content, FileFormat::Json).is_err());

        let content = r#"{"signup": {"max_attempts": 1, "window": 1000}}"#;
        assert!(PolicySet::parse(content, FileFormat::Json).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policies.toml");
        std::fs::write(
            &path,
            "[order_creation]\nmax_attempts = 2\nwindow_ms = 1000\n",
        )
        .unwrap();

        let set = PolicySet::from_file(&path).unwrap();
        assert_eq!(set.get(OperationKind::OrderCreation).max_attempts, 2);

        assert!(PolicySet::from_file(dir.path().join("policies.yaml")).is_err());
        assert!(PolicySet::from_file(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(FileFormat::from_extension("json"), Some(FileFormat::Json));
        assert_eq!(FileFormat::from_extension("TOML"), Some(FileFormat::Toml));
        assert_eq!(FileFormat::from_extension("env"), None);
    }
}
