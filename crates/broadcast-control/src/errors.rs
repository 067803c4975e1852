//! Broadcast control error types.
//!
//! Authorization failures are reported distinctly from infrastructure
//! failures so a caller can render "access denied" vs. "try again".
//! Internal details are logged server-side but not exposed to callers.

use thiserror::Error;

/// Broadcast control error type.
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// Resolver denial. Never retried; surfaced verbatim to the caller.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Stream or memorial does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflicting operation (e.g., start while already live).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Live-video platform or bridge call failed.
    #[error("External platform error: {0}")]
    ExternalPlatform(String),

    /// Document store operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (channel failures, actor shutdown races).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BroadcastError {
    /// Whether a caller may immediately retry the failed operation.
    ///
    /// Only infrastructure failures qualify; denials and conflicts are
    /// stable until the underlying state changes.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BroadcastError::ExternalPlatform(_)
                | BroadcastError::Storage(_)
                | BroadcastError::Internal(_)
        )
    }

    /// Caller-safe message with internal details stripped.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            BroadcastError::Unauthorized(_) => "Access denied".to_string(),
            BroadcastError::NotFound(_) => "Resource not found".to_string(),
            BroadcastError::Conflict(msg) => msg.clone(),
            BroadcastError::ExternalPlatform(_) | BroadcastError::Storage(_) => {
                "A temporary error occurred, please try again".to_string()
            }
            BroadcastError::Config(_) | BroadcastError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }
}
