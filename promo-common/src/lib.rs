//! Common types and utilities shared across promo-watch crates.
//!
//! This crate defines the behavior enums read from configuration, the
//! observability helpers, the fixed-delay retry helper and the shared error
//! type used throughout the workspace. It stays dependency-light so that the
//! parsing core can depend on it without pulling in browser or HTTP stacks.
//!
//! # Overview
//!
//! - [`LogLevel`]: operator-facing verbosity with lenient parsing
//! - [`MarkerScope`] and [`StopPolicy`]: scan behavior switches
//! - [`observability`]: centralised tracing/logging initialisation
//! - [`retry`]: bounded retries with a fixed delay for collaborator calls
//! - [`PromoError`]: shared error handling
//!
//! # Examples
//!
//! ```rust
//! use promo_common::{LogLevel, MarkerScope, StopPolicy};
//!
//! assert_eq!(LogLevel::parse_lenient("warning"), LogLevel::Warning);
//! assert_eq!(LogLevel::parse_lenient("chatty"), LogLevel::Info);
//! assert_eq!(MarkerScope::default(), MarkerScope::SingleMessage);
//! assert_eq!(StopPolicy::default(), StopPolicy::FirstEvent);
//! ```
use serde::{Deserialize, Serialize};

pub mod observability;
pub mod retry;

/// Operator-facing log verbosity.
///
/// Accepts `DEBUG`, `INFO`, `WARNING`, `ERROR` and `CRITICAL` in any case.
/// Anything else falls back to [`LogLevel::Info`] instead of failing the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "RawLevel", into = "String")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Self::Debug,
            "INFO" => Self::Info,
            "WARNING" => Self::Warning,
            "ERROR" => Self::Error,
            "CRITICAL" => Self::Critical,
            _ => Self::Info,
        }
    }

    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            // tracing has no level above error
            Self::Error | Self::Critical => "error",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Whatever scalar a config source produced for the level. Env overlays parse
/// `PROMO_LOG__LEVEL=5` as a number, which must still fall back to INFO.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawLevel {
    Name(String),
    Other(serde::de::IgnoredAny),
}

impl From<RawLevel> for LogLevel {
    fn from(raw: RawLevel) -> Self {
        match raw {
            RawLevel::Name(name) => Self::parse_lenient(&name),
            RawLevel::Other(_) => Self::Info,
        }
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.as_str().to_string()
    }
}

/// How long a timestamp marker stays in effect while pairing fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerScope {
    /// A marker applies to the first message after it, then resets.
    #[default]
    SingleMessage,
    /// A marker applies to every message until the next marker.
    UntilNextMarker,
}

/// When the driving loop stops scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    /// Stop once the first event announcement has been handled.
    #[default]
    FirstEvent,
    /// Keep handling announcements until one resolves to a date before today.
    UntilPastEvent,
}

/// Encoding used by the log sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Error types used across promo-watch.
#[derive(thiserror::Error, Debug)]
pub enum PromoError {
    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A driver (browser, page source) reported an error.
    #[error("Driver error: {0}")]
    Driver(#[from] anyhow::Error),

    /// The dedup ledger could not be read or appended.
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// The registration side effect failed after its retry budget.
    #[error("Registration failed: {0}")]
    Registration(String),

    /// The whole scan window was read without a single event announcement.
    #[error("No event announcement found after scanning {fragments} fragments")]
    NoEventFound { fragments: usize },
}

impl PromoError {
    /// Process exit status for this failure. A scan that found nothing is
    /// reported separately from infrastructure failures.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::NoEventFound { .. } => 2,
            _ => 1,
        }
    }
}
