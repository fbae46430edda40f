//! Error types for rate limiting
//!
//! A denied attempt is never an error: it is reported through
//! [`RateLimitCheckResult`](crate::RateLimitCheckResult). These errors cover
//! invalid policies and ledger storage failures only.

use thiserror::Error;

/// Result type for rate limiting operations
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Rate limiting errors
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Store error (file, memory, Redis, etc.)
    #[error("Rate limit store error: {0}")]
    StoreError(String),

    /// Persisted ledger could not be decoded
    #[error("Corrupt rate limit ledger: {0}")]
    CorruptLedger(String),

    /// Configuration error
    #[error("Rate limit configuration error: {0}")]
    ConfigError(String),

    /// Ledger could not be encoded
    #[error("Rate limit serialization error: {0}")]
    Serialization(String),

    /// Filesystem error
    #[error("Rate limit I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Redis connection error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),
}

impl RateLimitError {
    /// Create a new store error
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::StoreError(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a new corrupt ledger error
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        Self::CorruptLedger(msg.into())
    }

    /// Whether this error came from the persistence layer rather than the caller
    pub fn is_storage(&self) -> bool {
        match self {
            Self::ConfigError(_) => false,
            Self::StoreError(_) | Self::CorruptLedger(_) | Self::Serialization(_) | Self::Io(_) => {
                true
            }
            #[cfg(feature = "redis")]
            Self::RedisError(_) => true,
        }
    }

    /// Check if this error means the stored ledger is unreadable
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::CorruptLedger(_))
    }
}
