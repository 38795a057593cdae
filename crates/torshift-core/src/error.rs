//! Error types for torshift core library.

use thiserror::Error;

/// Result type alias using torshift Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for torshift configuration and setup.
#[derive(Debug, Error)]
pub enum Error {
    /// Rotation interval is zero or negative
    #[error("Rotation interval must be a positive number of seconds (got {0})")]
    InvalidInterval(i64),

    /// Proxy endpoint could not be parsed
    #[error("Invalid proxy endpoint '{input}': {reason}")]
    InvalidProxy { input: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
