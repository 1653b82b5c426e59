//! Error types for the statesync system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for statesync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the statesync system
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Value source-related errors
    #[error("Value source error: {0}")]
    Source(String),

    /// Listener registry-related errors
    #[error("Listener registry error: {0}")]
    Registry(String),

    /// I/O errors (config file loading)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a value source error
    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    /// Create a listener registry error
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Outcome classification for remote fetches
///
/// The synchronizer never inspects transport details. A source implementation
/// maps whatever its transport reports onto this two-way split, and the fetch
/// loop decides retry vs. stop from the classification alone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Transient remote failure. Retried under backoff; never surfaced to
    /// callers directly.
    #[error("retryable fetch failure: {0}")]
    Retryable(String),

    /// The remote authoritatively says no further value will arrive for this
    /// identity. Stops the fetch loop without raising an application error.
    #[error("terminal fetch result: {0}")]
    Terminal(String),
}

impl FetchError {
    /// Create a retryable fetch error
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    /// Create a terminal fetch error
    pub fn terminal(msg: impl Into<String>) -> Self {
        Self::Terminal(msg.into())
    }

    /// Whether the fetch loop should retry after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Whether this error ends the fetch loop
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}

/// Send failure reported by a listener endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// The peer behind the endpoint is gone. The registry prunes the
    /// endpoint silently; nothing is surfaced to broadcast callers.
    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),
}
