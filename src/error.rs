//! Error types for the period coordination system.

use thiserror::Error;

/// Period and month validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    #[error("Period out of range: {0} (must be within 2000..=2100)")]
    OutOfRange(i64),

    #[error("Month out of range: {0} (must be within 1..=12)")]
    MonthOutOfRange(i64),

    #[error("Unknown change source: {0}")]
    UnknownSource(String),
}

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed stored value for key '{key}': {message}")]
    Malformed { key: String, message: String },

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failure reported by a host refresh operation
#[derive(Debug, Clone, Error)]
#[error("Refresh failed: {0}")]
pub struct RefreshError(pub String);

impl RefreshError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Top-level errors surfaced by runtime setup and the CLI
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Invalid period: {0}")]
    PeriodError(#[from] PeriodError),

    #[error("Signal bus closed")]
    BusClosed,

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Async runtime error: {0}")]
    RuntimeError(String),

    #[error("Replay script error at line {line}: {message}")]
    ReplayError { line: usize, message: String },
}

impl From<config::ConfigError> for GuardError {
    fn from(err: config::ConfigError) -> Self {
        GuardError::ConfigError(err.to_string())
    }
}
