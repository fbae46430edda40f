//! Campus Market Logging
//!
//! Installs a `tracing` subscriber configured from the environment. Library
//! crates in the workspace log through `tracing` macros; binaries and test
//! harnesses call [`init`] once at startup.
//!
//! # Usage
//!
//! ```rust
//! campus_market_log::init();
//! tracing::info!(port = 8080, "Server started");
//! ```
//!
//! # Environment Variables
//!
//! - `CAMPUS_MARKET_DEBUG=1` - Enable debug logging
//! - `CAMPUS_MARKET_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `CAMPUS_MARKET_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `CAMPUS_MARKET_LOG_COLOR=1|0` - Enable/disable colors
//! - `CAMPUS_MARKET_LOG_MODULE=1|0` - Include the event target
//! - `RUST_LOG` - Full `EnvFilter` directives; overrides the level

use once_cell::sync::Lazy;
use std::env;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt};

// ============================================================================
// Log Levels
// ============================================================================

/// Minimum level of events to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    /// Trace level (most verbose)
    Trace = 0,
    /// Debug level
    Debug = 1,
    /// Info level
    Info = 2,
    /// Warning level
    Warn = 3,
    /// Error level (least verbose)
    Error = 4,
    /// Off (no logging)
    Off = 5,
}

impl Level {
    /// Get level from its name.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Get level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Off => "OFF",
        }
    }

    /// Directive understood by [`EnvFilter`].
    pub fn as_filter(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line human readable output
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for structured logging
    Json,
}

impl Format {
    /// Get format from its name.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Global configuration (lazy initialized).
static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether colors are enabled
    pub color: bool,
    /// Whether to include the event target
    pub module_path: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            color: false, // JSON output doesn't use colors
            module_path: true,
        }
    }
}

fn flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Create config through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let debug = lookup("CAMPUS_MARKET_DEBUG")
            .map(|v| flag(&v))
            .unwrap_or(false);

        let level = lookup("CAMPUS_MARKET_LOG_LEVEL")
            .and_then(|s| Level::from_name(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = lookup("CAMPUS_MARKET_LOG_FORMAT")
            .and_then(|s| Format::from_name(&s))
            .unwrap_or(Format::Json);

        let color = lookup("CAMPUS_MARKET_LOG_COLOR")
            .map(|v| flag(&v))
            .unwrap_or_else(|| {
                format != Format::Json && lookup("NO_COLOR").is_none() && lookup("TERM").is_some()
            });

        let module_path = lookup("CAMPUS_MARKET_LOG_MODULE")
            .map(|v| flag(&v))
            .unwrap_or(true);

        Self {
            debug,
            level,
            format,
            color,
            module_path,
        }
    }

    /// Filter used when `RUST_LOG` is not set.
    pub fn default_filter(&self) -> EnvFilter {
        EnvFilter::new(self.level.as_filter())
    }
}

/// Get the global configuration.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

// ============================================================================
// Subscriber Installation
// ============================================================================

/// Install the global subscriber described by [`config`].
///
/// Safe to call more than once; only the first call installs anything.
pub fn init() {
    let _ = try_init();
}

/// Install the global subscriber, reporting if one is already set.
pub fn try_init() -> Result<(), TryInitError> {
    try_init_with(config())
}

/// Install a global subscriber for an explicit configuration.
pub fn try_init_with(config: &LogConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| config.default_filter());
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        Format::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(config.module_path)
                    .with_ansi(false),
            )
            .try_init(),
        Format::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(config.module_path)
                    .with_ansi(config.color),
            )
            .try_init(),
        Format::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(config.module_path)
                    .with_ansi(config.color),
            )
            .try_init(),
    }
}

// ============================================================================
// Tests
// ============================================================================
