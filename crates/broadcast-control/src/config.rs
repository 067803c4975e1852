//! Broadcast control configuration.
//!
//! Configuration is loaded from environment variables. The platform API
//! token is redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default live-video platform request timeout in seconds.
pub const DEFAULT_PLATFORM_TIMEOUT_SECONDS: u64 = 10;

/// Default interval between recording readiness polls in seconds.
pub const DEFAULT_RECORDING_POLL_INTERVAL_SECONDS: u64 = 30;

/// Default maximum recording readiness poll attempts.
///
/// 20 attempts at 30s covers the ~10 minute window the platform needs to
/// make a recording asset playable; after that the resource completes
/// without a recording rather than blocking forever.
pub const DEFAULT_RECORDING_POLL_MAX_ATTEMPTS: u32 = 20;

/// Default recording mode requested when creating a live input.
pub const DEFAULT_RECORDING_MODE: &str = "automatic";

/// Broadcast control configuration.
///
/// Loaded from environment variables with sensible defaults.
#[derive(Clone)]
pub struct BroadcastConfig {
    /// Live-video platform API base URL.
    pub platform_base_url: String,

    /// Live-video platform API token.
    /// Protected by `SecretString` to prevent accidental logging.
    pub platform_api_token: SecretString,

    /// Timeout applied to every platform API request.
    pub platform_timeout: Duration,

    /// Interval between recording readiness polls.
    pub recording_poll_interval: Duration,

    /// Maximum recording readiness poll attempts before giving up.
    pub recording_poll_max_attempts: u32,

    /// Recording mode requested when creating a live input.
    pub recording_mode: String,
}

/// Custom Debug implementation that redacts the API token.
impl fmt::Debug for BroadcastConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastConfig")
            .field("platform_base_url", &self.platform_base_url)
            .field("platform_api_token", &"[REDACTED]")
            .field("platform_timeout", &self.platform_timeout)
            .field("recording_poll_interval", &self.recording_poll_interval)
            .field(
                "recording_poll_max_attempts",
                &self.recording_poll_max_attempts,
            )
            .field("recording_mode", &self.recording_mode)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl BroadcastConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let platform_base_url = vars
            .get("LIVE_PLATFORM_BASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("LIVE_PLATFORM_BASE_URL".to_string()))?
            .clone();

        let platform_api_token = SecretString::from(
            vars.get("LIVE_PLATFORM_API_TOKEN")
                .ok_or_else(|| ConfigError::MissingEnvVar("LIVE_PLATFORM_API_TOKEN".to_string()))?
                .clone(),
        );

        let platform_timeout = Duration::from_secs(
            vars.get("LIVE_PLATFORM_TIMEOUT_SECONDS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PLATFORM_TIMEOUT_SECONDS),
        );

        let recording_poll_interval = Duration::from_secs(
            vars.get("RECORDING_POLL_INTERVAL_SECONDS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RECORDING_POLL_INTERVAL_SECONDS),
        );

        let recording_poll_max_attempts = vars
            .get("RECORDING_POLL_MAX_ATTEMPTS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RECORDING_POLL_MAX_ATTEMPTS);

        if recording_poll_max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "RECORDING_POLL_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        let recording_mode = vars
            .get("RECORDING_MODE")
            .cloned()
            .unwrap_or_else(|| DEFAULT_RECORDING_MODE.to_string());

        Ok(BroadcastConfig {
            platform_base_url,
            platform_api_token,
            platform_timeout,
            recording_poll_interval,
            recording_poll_max_attempts,
            recording_mode,
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
                "LIVE_PLATFORM_BASE_URL".to_string(),
                "https://video.example.com/v1".to_string(),
            ),
            (
                "LIVE_PLATFORM_API_TOKEN".to_string(),
                "token-123".to_string(),
            ),
        ])
    }

    #[test]
    fn test_defaults_applied() {
        let config = BroadcastConfig::from_vars(&base_vars()).unwrap();

        assert_eq!(
            config.platform_timeout,
            Duration::from_secs(DEFAULT_PLATFORM_TIMEOUT_SECONDS)
        );
        assert_eq!(
            config.recording_poll_interval,
            Duration::from_secs(DEFAULT_RECORDING_POLL_INTERVAL_SECONDS)
        );
        assert_eq!(
            config.recording_poll_max_attempts,
            DEFAULT_RECORDING_POLL_MAX_ATTEMPTS
        );
        assert_eq!(config.recording_mode, DEFAULT_RECORDING_MODE);
    }

    #[test]
    fn test_missing_base_url_is_an_error() {
        let mut vars = base_vars();
        vars.remove("LIVE_PLATFORM_BASE_URL");

        let err = BroadcastConfig::from_vars(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn test_zero_poll_attempts_rejected() {
        let mut vars = base_vars();
        vars.insert("RECORDING_POLL_MAX_ATTEMPTS".to_string(), "0".to_string());

        let err = BroadcastConfig::from_vars(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_debug_redacts_api_token() {
        let config = BroadcastConfig::from_vars(&base_vars()).unwrap();
        let debug_str = format!("{config:?}");

        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("token-123"));
    }

    #[test]
    fn test_overrides_parsed() {
        let mut vars = base_vars();
        vars.insert(
            "RECORDING_POLL_INTERVAL_SECONDS".to_string(),
            "5".to_string(),
        );
        vars.insert("RECORDING_POLL_MAX_ATTEMPTS".to_string(), "3".to_string());

        let config = BroadcastConfig::from_vars(&vars).unwrap();
        assert_eq!(config.recording_poll_interval, Duration::from_secs(5));
        assert_eq!(config.recording_poll_max_attempts, 3);
    }
}
