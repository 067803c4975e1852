//! Recording bridge HTTP client.
//!
//! Three calls: reserve a bridge, exchange SDP with it, release it.
//! The SDP exchange posts the raw offer body as `application/sdp` and
//! receives the answer body back; there is no JSON envelope.

use crate::config::BridgeConfig;
use crate::errors::BridgeError;
use crate::models::BridgeGrant;
use common::secret::{ExposeSecret, SecretString};
use common::types::StreamId;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, instrument, warn};

/// Recording bridge operations (enables mocking).
#[async_trait::async_trait]
pub trait RecordingBridgeClient: Send + Sync {
    /// Reserve a bridge for a stream. Mutating: never auto-retried.
    async fn start_bridge(&self, stream_id: StreamId) -> Result<BridgeGrant, BridgeError>;

    /// Post the SDP offer to the bridge endpoint; returns the answer.
    async fn exchange_sdp(&self, endpoint: &str, offer: &str) -> Result<String, BridgeError>;

    /// Release a bridge. Mutating: never auto-retried; tolerates an
    /// already-released bridge.
    async fn stop_bridge(&self, bridge_id: &str) -> Result<(), BridgeError>;
}

#[derive(Debug, Serialize)]
struct StartBridgeRequest {
    stream_id: StreamId,
}

/// HTTP client for the recording bridge API.
pub struct HttpRecordingBridgeClient {
    client: Client,
    base_url: String,
    api_token: SecretString,
}

impl HttpRecordingBridgeClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Internal` if the HTTP client cannot be
    /// built.
    pub fn new(config: &BridgeConfig) -> Result<Self, BridgeError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                error!(target: "bridge.client", error = %e, "Failed to build HTTP client");
                BridgeError::Internal("failed to build bridge HTTP client".to_string())
            })?;

        Ok(Self {
            client,
            base_url: config.bridge_base_url.clone(),
            api_token: config.bridge_api_token.clone(),
        })
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_token.expose_secret())
    }
}

#[async_trait::async_trait]
impl RecordingBridgeClient for HttpRecordingBridgeClient {
    #[instrument(skip_all, name = "bridge.client.start", fields(stream_id = %stream_id))]
    async fn start_bridge(&self, stream_id: StreamId) -> Result<BridgeGrant, BridgeError> {
        let url = format!("{}/bridges", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&StartBridgeRequest { stream_id })
            .send()
            .await
            .map_err(|e| {
                warn!(target: "bridge.client", error = %e, "Bridge start request failed");
                BridgeError::StartFailed("bridge is unavailable".to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(target: "bridge.client", status = %status, "Bridge start rejected");
            return Err(BridgeError::StartFailed(format!(
                "bridge start returned {status}"
            )));
        }

        response.json().await.map_err(|e| {
            error!(target: "bridge.client", error = %e, "Failed to parse bridge grant");
            BridgeError::StartFailed("malformed bridge grant".to_string())
        })
    }

    #[instrument(skip_all, name = "bridge.client.exchange_sdp")]
    async fn exchange_sdp(&self, endpoint: &str, offer: &str) -> Result<String, BridgeError> {
        let response = self
            .client
            .post(endpoint)
            .header("Authorization", self.auth_header())
            .header("Content-Type", "application/sdp")
            .body(offer.to_string())
            .send()
            .await
            .map_err(|e| {
                warn!(target: "bridge.client", error = %e, "SDP exchange request failed");
                BridgeError::NegotiationFailed("sdp exchange request failed".to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(target: "bridge.client", status = %status, "SDP exchange rejected");
            return Err(BridgeError::NegotiationFailed(format!(
                "sdp exchange returned {status}"
            )));
        }

        let answer = response.text().await.map_err(|e| {
            warn!(target: "bridge.client", error = %e, "Failed to read answer body");
            BridgeError::NegotiationFailed("unreadable answer body".to_string())
        })?;
        if answer.trim().is_empty() {
            return Err(BridgeError::NegotiationFailed(
                "empty answer body".to_string(),
            ));
        }
        Ok(answer)
    }

    #[instrument(skip_all, name = "bridge.client.stop", fields(bridge_id = %bridge_id))]
    async fn stop_bridge(&self, bridge_id: &str) -> Result<(), BridgeError> {
        let url = format!("{}/bridges/{bridge_id}", self.base_url);

        let response = self
            .client
            .delete(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| {
                warn!(target: "bridge.client", error = %e, "Bridge stop request failed");
                BridgeError::Internal("bridge stop request failed".to_string())
            })?;

        let status = response.status();
        // An already-released bridge is success for our purposes.
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            warn!(target: "bridge.client", status = %status, "Bridge stop rejected");
            Err(BridgeError::Internal(format!(
                "bridge stop returned {status}"
            )))
        }
    }
}

/// Mock bridge client for testing.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Scripted mock of the recording bridge.
    #[derive(Default)]
    pub struct MockBridgeClient {
        fail_start: AtomicBool,
        fail_exchange: AtomicBool,
        hang_exchange: AtomicBool,
        start_count: AtomicUsize,
        exchange_count: AtomicUsize,
        stop_count: AtomicUsize,
        counter: AtomicUsize,
    }

    impl MockBridgeClient {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_start(&self, fail: bool) {
            self.fail_start.store(fail, Ordering::SeqCst);
        }

        pub fn fail_exchange(&self, fail: bool) {
            self.fail_exchange.store(fail, Ordering::SeqCst);
        }

        /// Make `exchange_sdp` hang forever; exercises the negotiation
        /// deadline.
        pub fn hang_exchange(&self, hang: bool) {
            self.hang_exchange.store(hang, Ordering::SeqCst);
        }

        pub fn start_count(&self) -> usize {
            self.start_count.load(Ordering::SeqCst)
        }

        pub fn exchange_count(&self) -> usize {
            self.exchange_count.load(Ordering::SeqCst)
        }

        pub fn stop_count(&self) -> usize {
            self.stop_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl RecordingBridgeClient for MockBridgeClient {
        async fn start_bridge(&self, _stream_id: StreamId) -> Result<BridgeGrant, BridgeError> {
            self.start_count.fetch_add(1, Ordering::SeqCst);
            if self.fail_start.load(Ordering::SeqCst) {
                return Err(BridgeError::StartFailed("mock start failure".to_string()));
            }
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(BridgeGrant {
                bridge_id: format!("bridge-{n}"),
                endpoint: format!("https://bridge.example.com/v1/bridges/bridge-{n}/sdp"),
            })
        }

        async fn exchange_sdp(&self, _endpoint: &str, offer: &str) -> Result<String, BridgeError> {
            self.exchange_count.fetch_add(1, Ordering::SeqCst);
            if self.hang_exchange.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.fail_exchange.load(Ordering::SeqCst) {
                return Err(BridgeError::NegotiationFailed(
                    "mock exchange failure".to_string(),
                ));
            }
            Ok(offer.replace("offer", "answer"))
        }

        async fn stop_bridge(&self, _bridge_id: &str) -> Result<(), BridgeError> {
            self.stop_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> HttpRecordingBridgeClient {
        let vars = HashMap::from([
            ("BRIDGE_BASE_URL".to_string(), server.uri()),
            ("BRIDGE_API_TOKEN".to_string(), "test-token".to_string()),
        ]);
        HttpRecordingBridgeClient::new(&BridgeConfig::from_vars(&vars).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_start_bridge_parses_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bridges"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "bridge_id": "bridge-7",
                "endpoint": format!("{}/bridges/bridge-7/sdp", "https://bridge.example.com"),
            })))
            .mount(&server)
            .await;

        let grant = client(&server)
            .await
            .start_bridge(StreamId::new())
            .await
            .unwrap();
        assert_eq!(grant.bridge_id, "bridge-7");
    }

    #[tokio::test]
    async fn test_start_rejection_is_start_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bridges"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .start_bridge(StreamId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::StartFailed(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_exchange_posts_raw_sdp() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sdp"))
            .and(header("Content-Type", "application/sdp"))
            .and(body_string("v=0 offer"))
            .respond_with(ResponseTemplate::new(200).set_body_string("v=0 answer"))
            .mount(&server)
            .await;

        let endpoint = format!("{}/sdp", server.uri());
        let answer = client(&server)
            .await
            .exchange_sdp(&endpoint, "v=0 offer")
            .await
            .unwrap();
        assert_eq!(answer, "v=0 answer");
    }

    #[tokio::test]
    async fn test_empty_answer_is_negotiation_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sdp"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;

        let endpoint = format!("{}/sdp", server.uri());
        let err = client(&server)
            .await
            .exchange_sdp(&endpoint, "v=0 offer")
            .await
            .unwrap_err();
        assert!(err.requires_stop());
    }

    #[tokio::test]
    async fn test_stop_tolerates_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/bridges/bridge-7"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        client(&server).await.stop_bridge("bridge-7").await.unwrap();
    }
}
