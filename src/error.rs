//! Error types for sqlbench.
//!
//! Query failures during a benchmark are recorded as data, not raised.
//! This enum covers everything that stops a command instead.

use thiserror::Error;

/// Main error type for sqlbench operations.
#[derive(Error, Debug)]
pub enum BenchError {
    /// Database connection errors (host unreachable, auth failed, session reset rejected).
    #[error("Connection error: {0}")]
    Connection(String),

    /// Unreadable config file or out-of-range settings.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input file errors (missing file, malformed rows, missing columns).
    #[error("Input error: {0}")]
    Input(String),

    /// Output file errors (cannot create or write results).
    #[error("Output error: {0}")]
    Output(String),

    /// Broken internal invariants, such as a row with the wrong number of runs.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BenchError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an input error with the given message.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    /// Creates an output error with the given message.
    pub fn output(msg: impl Into<String>) -> Self {
        Self::Output(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Config(_) => "Configuration Error",
            Self::Input(_) => "Input Error",
            Self::Output(_) => "Output Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using BenchError.
pub type Result<T> = std::result::Result<T, BenchError>;
