//! Error types for a3s-permwatch

use thiserror::Error;

/// Errors that can occur in the monitoring pipeline
///
/// None of these ever reach the caller of an intercepted capability API.
/// Transport and parse failures are absorbed by the classifier fallback,
/// relay failures are logged at the send site, and timeouts resolve to
/// the caller's fallback decision.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Scoring service unreachable or answered with a non-2xx status
    #[error("Transport error: {0}")]
    Transport(String),

    /// Scoring service answered with a body that does not decode
    #[error("Parse error: {0}")]
    Parse(String),

    /// Destination context unreachable (closed, torn down, or full)
    #[error("Relay error: {0}")]
    Relay(String),

    /// Confirmation left unanswered within its bound
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Permission event state transition that is not allowed
    #[error("Invalid permission state transition: {from} -> {to}")]
    InvalidTransition {
        from: String,
        to: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// State could not be loaded or saved
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for monitoring operations
pub type Result<T> = std::result::Result<T, WatchError>;
