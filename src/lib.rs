// Campus Market - abuse protection for the campus food marketplace
//
// Re-exports the rate limiter that guards login, signup, listing creation,
// order creation and password reset, together with the logging setup.

pub use campus_market_log as log;
pub use campus_market_ratelimit as ratelimit;

// Prelude for common imports
pub mod prelude {
    pub use campus_market_ratelimit::{
        Clock, FileStore, LedgerStore, LimiterSettings, ManualClock, MemoryStore, OperationKind,
        PolicySet, RateLimitCheckResult, RateLimitConfig, RateLimitError, RateLimitResult,
        RateLimitStatus, RateLimiter, RateLimiterBuilder, SystemClock,
    };
}
