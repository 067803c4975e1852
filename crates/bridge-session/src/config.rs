//! Bridge session configuration.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default bridge API request timeout in seconds.
pub const DEFAULT_BRIDGE_TIMEOUT_SECONDS: u64 = 10;

/// Default deadline for the whole SDP offer/answer negotiation in
/// seconds. Covers offer creation, the exchange round trip, and setting
/// the remote description.
pub const DEFAULT_NEGOTIATION_TIMEOUT_SECONDS: u64 = 15;

/// Default deadline in seconds for a negotiated session to reach
/// `Connected`. A session stuck in ICE/DTLS establishment is failed at
/// this deadline so callers never wait on it indefinitely.
pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 30;

/// Bridge session configuration.
#[derive(Clone)]
pub struct BridgeConfig {
    /// Recording bridge API base URL.
    pub bridge_base_url: String,

    /// Recording bridge API token.
    /// Protected by `SecretString` to prevent accidental logging.
    pub bridge_api_token: SecretString,

    /// Timeout applied to every bridge API request.
    pub request_timeout: Duration,

    /// Deadline for the complete SDP negotiation.
    pub negotiation_timeout: Duration,

    /// Deadline for a negotiated session to reach `Connected`.
    pub connect_timeout: Duration,
}

/// Custom Debug implementation that redacts the API token.
impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("bridge_base_url", &self.bridge_base_url)
            .field("bridge_api_token", &"[REDACTED]")
            .field("request_timeout", &self.request_timeout)
            .field("negotiation_timeout", &self.negotiation_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bridge_base_url = vars
            .get("BRIDGE_BASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("BRIDGE_BASE_URL".to_string()))?
            .clone();

        let bridge_api_token = SecretString::from(
            vars.get("BRIDGE_API_TOKEN")
                .ok_or_else(|| ConfigError::MissingEnvVar("BRIDGE_API_TOKEN".to_string()))?
                .clone(),
        );

        let request_timeout = Duration::from_secs(
            vars.get("BRIDGE_REQUEST_TIMEOUT_SECONDS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BRIDGE_TIMEOUT_SECONDS),
        );

        let negotiation_timeout = Duration::from_secs(
            vars.get("BRIDGE_NEGOTIATION_TIMEOUT_SECONDS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_NEGOTIATION_TIMEOUT_SECONDS),
        );

        let connect_timeout = Duration::from_secs(
            vars.get("BRIDGE_CONNECT_TIMEOUT_SECONDS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECONDS),
        );

        Ok(BridgeConfig {
            bridge_base_url,
            bridge_api_token,
            request_timeout,
            negotiation_timeout,
            connect_timeout,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            (
                "BRIDGE_BASE_URL".to_string(),
                "https://bridge.example.com/v1".to_string(),
            ),
            ("BRIDGE_API_TOKEN".to_string(), "bridge-token".to_string()),
        ])
    }

    #[test]
    fn test_defaults_applied() {
        let config = BridgeConfig::from_vars(&base_vars()).unwrap();
        assert_eq!(
            config.request_timeout,
            Duration::from_secs(DEFAULT_BRIDGE_TIMEOUT_SECONDS)
        );
        assert_eq!(
            config.negotiation_timeout,
            Duration::from_secs(DEFAULT_NEGOTIATION_TIMEOUT_SECONDS)
        );
        assert_eq!(
            config.connect_timeout,
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECONDS)
        );
    }

    #[test]
    fn test_missing_token_is_an_error() {
        let mut vars = base_vars();
        vars.remove("BRIDGE_API_TOKEN");
        assert!(matches!(
            BridgeConfig::from_vars(&vars).unwrap_err(),
            ConfigError::MissingEnvVar(_)
        ));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = BridgeConfig::from_vars(&base_vars()).unwrap();
        let debug_str = format!("{config:?}");
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("bridge-token"));
    }
}
