//! Bridge session error types.
//!
//! The central distinction is between a failed bridge-start call (no
//! infrastructure was reserved, safe to retry immediately) and a failed
//! SDP negotiation (infrastructure exists but is unconnected; the caller
//! must stop the session before retrying, or the reserved bridge leaks).

use thiserror::Error;

/// Bridge session error type.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The bridge-start call failed. Nothing was reserved remotely;
    /// retrying immediately is safe.
    #[error("Bridge start failed: {0}")]
    StartFailed(String),

    /// The SDP offer/answer exchange failed after a bridge was reserved.
    /// The session must be stopped before another start.
    #[error("Bridge negotiation failed: {0}")]
    NegotiationFailed(String),

    /// A session already exists for this stream.
    #[error("Bridge session already active for stream {0}")]
    AlreadyActive(String),

    /// No session exists for this stream.
    #[error("No bridge session for stream {0}")]
    NotFound(String),

    /// A network call exceeded its deadline.
    #[error("Bridge operation timed out: {0}")]
    Timeout(String),

    /// Internal error (poisoned state, channel failures).
    #[error("Internal bridge error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Whether the caller may retry `start` immediately, without an
    /// explicit stop first.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::StartFailed(_))
    }

    /// Whether remote infrastructure was reserved and an explicit stop
    /// is required before the next start.
    #[must_use]
    pub fn requires_stop(&self) -> bool {
        matches!(
            self,
            BridgeError::NegotiationFailed(_) | BridgeError::Timeout(_)
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_start_failure_is_retryable_without_stop() {
        let err = BridgeError::StartFailed("503".to_string());
        assert!(err.is_retryable());
        assert!(!err.requires_stop());
    }

    #[test]
    fn test_negotiation_failure_requires_stop() {
        let err = BridgeError::NegotiationFailed("malformed answer".to_string());
        assert!(!err.is_retryable());
        assert!(err.requires_stop());
    }
}
