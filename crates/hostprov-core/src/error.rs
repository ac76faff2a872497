//! Error types for the provisioning system
//!
//! This module defines all error types used throughout the crate.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the provisioning system
#[derive(Error, Debug)]
pub enum Error {
    /// Domain name failed syntax validation
    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// DNS lookup errors (resolver unavailable, malformed response, ...)
    #[error("DNS lookup error: {0}")]
    Dns(String),

    /// Filesystem errors raised while writing provisioning artifacts
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An external command could not be started or exited non-zero
    #[error("{program} failed: {detail}")]
    CommandFailed {
        /// Program that was invoked
        program: String,
        /// Diagnostic text produced by the process
        detail: String,
    },

    /// An external command exceeded its time budget
    #[error("{program} timed out after {}s", .after.as_secs())]
    Timeout {
        /// Program that was invoked
        program: String,
        /// The budget that was exceeded
        after: Duration,
    },

    /// The run was abandoned because the progress consumer went away
    #[error("Provisioning cancelled")]
    Cancelled,

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid domain error
    pub fn invalid_domain(msg: impl Into<String>) -> Self {
        Self::InvalidDomain(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a DNS lookup error
    pub fn dns(msg: impl Into<String>) -> Self {
        Self::Dns(msg.into())
    }

    /// Create a command failure
    pub fn command_failed(program: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::CommandFailed {
            program: program.into(),
            detail: detail.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(program: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            program: program.into(),
            after,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
