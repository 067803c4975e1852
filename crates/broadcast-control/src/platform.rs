//! External live-video platform client.
//!
//! The platform provisions live inputs (ingest endpoint + stream key),
//! exposes recorded assets once processing finishes, and tears inputs
//! down. Encoding and delivery are entirely the platform's problem.
//!
//! # Retry policy
//!
//! Only the idempotent `get_asset` read retries (bounded, with backoff).
//! `create_live_input` and `delete_live_input` are mutating and never
//! auto-retried, to avoid double-provisioning.

use crate::config::BroadcastConfig;
use crate::errors::BroadcastError;
use common::secret::{ExposeSecret, SecretString};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, instrument, warn};

/// Bounded retry attempts for idempotent reads.
const READ_RETRY_ATTEMPTS: u32 = 3;

/// Backoff base between read retries.
const READ_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Ingest credentials attached to a provisioned live input.
#[derive(Debug, Clone)]
pub struct IngestCredentials {
    /// RTMPS ingest URL.
    pub ingest_url: String,
    /// Stream key; redacted in Debug output.
    pub stream_key: SecretString,
}

/// A provisioned live input on the platform.
#[derive(Debug, Clone)]
pub struct LiveInput {
    pub id: String,
    pub credentials: IngestCredentials,
    /// Playback reference (HLS URL or player id) for viewers.
    pub playback_ref: String,
}

/// Processing status of a recorded asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Processing,
    Ready,
    Errored,
}

/// A recorded asset derived from a live input.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetInfo {
    pub status: AssetStatus,
    #[serde(default)]
    pub playback_ref: Option<String>,
    #[serde(default)]
    pub thumbnail_ref: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
}

/// Live-video platform operations (enables mocking).
#[async_trait::async_trait]
pub trait LiveVideoPlatform: Send + Sync {
    /// Provision a live input with the given display name and recording
    /// mode. Mutating: never auto-retried.
    async fn create_live_input(
        &self,
        name: &str,
        recording_mode: &str,
    ) -> Result<LiveInput, BroadcastError>;

    /// Fetch the recorded asset for a live input. Idempotent read.
    async fn get_asset(&self, external_media_id: &str) -> Result<AssetInfo, BroadcastError>;

    /// Tear down a live input. Mutating: never auto-retried.
    async fn delete_live_input(&self, external_media_id: &str) -> Result<(), BroadcastError>;
}

#[derive(Debug, Serialize)]
struct CreateLiveInputRequest<'a> {
    name: &'a str,
    recording_mode: &'a str,
}

#[derive(Debug, Deserialize)]
struct LiveInputResponse {
    id: String,
    ingest_url: String,
    stream_key: String,
    playback_ref: String,
}

/// HTTP client for the live-video platform API.
pub struct HttpLiveVideoPlatform {
    client: Client,
    base_url: String,
    api_token: SecretString,
}

impl HttpLiveVideoPlatform {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `BroadcastError::Config` if the HTTP client cannot be
    /// built.
    pub fn new(config: &BroadcastConfig) -> Result<Self, BroadcastError> {
        let client = Client::builder()
            .timeout(config.platform_timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                error!(target: "broadcast.platform", error = %e, "Failed to build HTTP client");
                BroadcastError::Config("failed to build platform HTTP client".to_string())
            })?;

        Ok(Self {
            client,
            base_url: config.platform_base_url.clone(),
            api_token: config.platform_api_token.clone(),
        })
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_token.expose_secret())
    }

    async fn get_asset_once(&self, external_media_id: &str) -> Result<AssetInfo, BroadcastError> {
        let url = format!("{}/live-inputs/{external_media_id}/asset", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| {
                warn!(target: "broadcast.platform", error = %e, "Asset request failed");
                BroadcastError::ExternalPlatform("live platform is unavailable".to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(target: "broadcast.platform", status = %status, "Asset request rejected");
            return Err(BroadcastError::ExternalPlatform(format!(
                "asset request returned {status}"
            )));
        }

        response.json().await.map_err(|e| {
            error!(target: "broadcast.platform", error = %e, "Failed to parse asset response");
            BroadcastError::ExternalPlatform("malformed asset response".to_string())
        })
    }
}

#[async_trait::async_trait]
impl LiveVideoPlatform for HttpLiveVideoPlatform {
    #[instrument(skip_all, name = "broadcast.platform.create_live_input", fields(name = %name))]
    async fn create_live_input(
        &self,
        name: &str,
        recording_mode: &str,
    ) -> Result<LiveInput, BroadcastError> {
        let url = format!("{}/live-inputs", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&CreateLiveInputRequest {
                name,
                recording_mode,
            })
            .send()
            .await
            .map_err(|e| {
                warn!(target: "broadcast.platform", error = %e, "Live input creation failed");
                BroadcastError::ExternalPlatform("live platform is unavailable".to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(target: "broadcast.platform", status = %status, "Live input creation rejected");
            return Err(BroadcastError::ExternalPlatform(format!(
                "live input creation returned {status}"
            )));
        }

        let body: LiveInputResponse = response.json().await.map_err(|e| {
            error!(target: "broadcast.platform", error = %e, "Failed to parse live input response");
            BroadcastError::ExternalPlatform("malformed live input response".to_string())
        })?;

        Ok(LiveInput {
            id: body.id,
            credentials: IngestCredentials {
                ingest_url: body.ingest_url,
                stream_key: SecretString::from(body.stream_key),
            },
            playback_ref: body.playback_ref,
        })
    }

    #[instrument(skip_all, name = "broadcast.platform.get_asset", fields(external_media_id = %external_media_id))]
    async fn get_asset(&self, external_media_id: &str) -> Result<AssetInfo, BroadcastError> {
        let mut last_err = None;

        for attempt in 0..READ_RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(READ_RETRY_BACKOFF * attempt).await;
            }
            match self.get_asset_once(external_media_id).await {
                Ok(asset) => return Ok(asset),
                Err(e) => {
                    warn!(
                        target: "broadcast.platform",
                        attempt = attempt + 1,
                        error = %e,
                        "Asset read attempt failed"
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| BroadcastError::Internal("asset read retry loop".to_string())))
    }

    #[instrument(skip_all, name = "broadcast.platform.delete_live_input", fields(external_media_id = %external_media_id))]
    async fn delete_live_input(&self, external_media_id: &str) -> Result<(), BroadcastError> {
        let url = format!("{}/live-inputs/{external_media_id}", self.base_url);

        let response = self
            .client
            .delete(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| {
                warn!(target: "broadcast.platform", error = %e, "Live input deletion failed");
                BroadcastError::ExternalPlatform("live platform is unavailable".to_string())
            })?;

        let status = response.status();
        // Deleting an already-deleted input is success for our purposes.
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            warn!(target: "broadcast.platform", status = %status, "Live input deletion rejected");
            Err(BroadcastError::ExternalPlatform(format!(
                "live input deletion returned {status}"
            )))
        }
    }
}

/// Mock platform for testing.
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted mock of the live-video platform.
    pub struct MockPlatform {
        /// Asset responses returned in sequence; the last repeats.
        asset_script: Mutex<VecDeque<Result<AssetInfo, BroadcastError>>>,
        fail_create: bool,
        create_count: AtomicUsize,
        asset_count: AtomicUsize,
        delete_count: AtomicUsize,
        counter: AtomicUsize,
    }

    impl MockPlatform {
        /// A platform where every call succeeds and assets are
        /// immediately ready.
        #[must_use]
        pub fn ready() -> Self {
            Self::with_asset_script(vec![Ok(AssetInfo {
                status: AssetStatus::Ready,
                playback_ref: Some("https://watch.example.com/rec-1".to_string()),
                thumbnail_ref: None,
                duration_seconds: Some(3600),
            })])
        }

        /// A platform whose asset never leaves `Processing`.
        #[must_use]
        pub fn never_ready() -> Self {
            Self::with_asset_script(vec![Ok(AssetInfo {
                status: AssetStatus::Processing,
                playback_ref: None,
                thumbnail_ref: None,
                duration_seconds: None,
            })])
        }

        /// A platform with a custom asset response sequence.
        #[must_use]
        pub fn with_asset_script(script: Vec<Result<AssetInfo, BroadcastError>>) -> Self {
            Self {
                asset_script: Mutex::new(script.into()),
                fail_create: false,
                create_count: AtomicUsize::new(0),
                asset_count: AtomicUsize::new(0),
                delete_count: AtomicUsize::new(0),
                counter: AtomicUsize::new(0),
            }
        }

        /// A platform whose live input creation fails.
        #[must_use]
        pub fn failing_create() -> Self {
            let mut mock = Self::ready();
            mock.fail_create = true;
            mock
        }

        pub fn create_count(&self) -> usize {
            self.create_count.load(Ordering::SeqCst)
        }

        pub fn asset_count(&self) -> usize {
            self.asset_count.load(Ordering::SeqCst)
        }

        pub fn delete_count(&self) -> usize {
            self.delete_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl LiveVideoPlatform for MockPlatform {
        async fn create_live_input(
            &self,
            _name: &str,
            _recording_mode: &str,
        ) -> Result<LiveInput, BroadcastError> {
            self.create_count.fetch_add(1, Ordering::SeqCst);

            if self.fail_create {
                return Err(BroadcastError::ExternalPlatform(
                    "mock live input creation failure".to_string(),
                ));
            }

            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(LiveInput {
                id: format!("input-{n}"),
                credentials: IngestCredentials {
                    ingest_url: "rtmps://ingest.example.com/live".to_string(),
                    stream_key: SecretString::from(format!("sk-{n}")),
                },
                playback_ref: format!("https://watch.example.com/input-{n}"),
            })
        }

        async fn get_asset(&self, _external_media_id: &str) -> Result<AssetInfo, BroadcastError> {
            self.asset_count.fetch_add(1, Ordering::SeqCst);

            let mut script = match self.asset_script.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if script.len() > 1 {
                script
                    .pop_front()
                    .unwrap_or(Err(BroadcastError::Internal("empty script".to_string())))
            } else {
                // Last response repeats.
                match script.front() {
                    Some(Ok(asset)) => Ok(asset.clone()),
                    Some(Err(e)) => Err(BroadcastError::ExternalPlatform(e.to_string())),
                    None => Err(BroadcastError::Internal("empty script".to_string())),
                }
            }
        }

        async fn delete_live_input(&self, _external_media_id: &str) -> Result<(), BroadcastError> {
            self.delete_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn platform(server: &MockServer) -> HttpLiveVideoPlatform {
        let vars = HashMap::from([
            ("LIVE_PLATFORM_BASE_URL".to_string(), server.uri()),
            (
                "LIVE_PLATFORM_API_TOKEN".to_string(),
                "test-token".to_string(),
            ),
        ]);
        let config = BroadcastConfig::from_vars(&vars).unwrap();
        HttpLiveVideoPlatform::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_create_live_input_parses_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/live-inputs"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "input-42",
                "ingest_url": "rtmps://ingest.example.com/live",
                "stream_key": "sk-live-42",
                "playback_ref": "https://watch.example.com/input-42",
            })))
            .mount(&server)
            .await;

        let input = platform(&server)
            .await
            .create_live_input("Rose Hill Service", "automatic")
            .await
            .unwrap();

        assert_eq!(input.id, "input-42");
        assert_eq!(input.credentials.stream_key.expose_secret(), "sk-live-42");
        // Credentials never leak through Debug.
        assert!(!format!("{input:?}").contains("sk-live-42"));
    }

    #[tokio::test]
    async fn test_create_live_input_maps_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/live-inputs"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = platform(&server)
            .await
            .create_live_input("x", "automatic")
            .await
            .unwrap_err();
        assert!(matches!(err, BroadcastError::ExternalPlatform(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_get_asset_retries_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/live-inputs/input-1/asset"))
            .respond_with(ResponseTemplate::new(500))
            .expect(u64::from(READ_RETRY_ATTEMPTS))
            .mount(&server)
            .await;

        let err = platform(&server).await.get_asset("input-1").await.unwrap_err();
        assert!(matches!(err, BroadcastError::ExternalPlatform(_)));
    }

    #[tokio::test]
    async fn test_delete_tolerates_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/live-inputs/input-1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        platform(&server).await.delete_live_input("input-1").await.unwrap();
    }
}
