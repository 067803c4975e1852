//! Bridge session manager.
//!
//! One session per stream id. `start` reserves a bridge, runs the SDP
//! offer/answer exchange under a deadline, and hands connection-state
//! tracking to a watcher task. `stop` is idempotent: local media
//! resources are released synchronously, the remote bridge is released
//! asynchronously and best-effort.
//!
//! A failed bridge-start leaves nothing behind and is safe to retry. A
//! failed negotiation leaves a reserved bridge behind; the session stays
//! registered as `Failed` and blocks further starts until an explicit
//! stop releases it.

use crate::client::RecordingBridgeClient;
use crate::config::BridgeConfig;
use crate::errors::BridgeError;
use crate::models::{BridgeStatus, SessionInfo};
use crate::observer::LifecycleObserver;
use crate::peer::{MediaPeer, MediaPeerFactory, PeerConnectionState};

use common::types::StreamId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

struct Session {
    bridge_id: String,
    peer: Arc<dyn MediaPeer>,
    status: Arc<StdMutex<BridgeStatus>>,
}

enum SessionSlot {
    /// A start is in flight; blocks concurrent starts.
    Pending,
    Active(Session),
}

fn read_status(status: &StdMutex<BridgeStatus>) -> BridgeStatus {
    match status.lock() {
        Ok(guard) => *guard,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

fn write_status(status: &StdMutex<BridgeStatus>, value: BridgeStatus) {
    match status.lock() {
        Ok(mut guard) => *guard = value,
        Err(poisoned) => *poisoned.into_inner() = value,
    }
}

/// Manages all bridge sessions.
pub struct BridgeSessionManager {
    client: Arc<dyn RecordingBridgeClient>,
    peers: Arc<dyn MediaPeerFactory>,
    observer: Arc<dyn LifecycleObserver>,
    config: BridgeConfig,
    sessions: Mutex<HashMap<StreamId, SessionSlot>>,
    cancel_token: CancellationToken,
}

impl BridgeSessionManager {
    #[must_use]
    pub fn new(
        client: Arc<dyn RecordingBridgeClient>,
        peers: Arc<dyn MediaPeerFactory>,
        observer: Arc<dyn LifecycleObserver>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            client,
            peers,
            observer,
            config,
            sessions: Mutex::new(HashMap::new()),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Start a bridge session for a stream.
    ///
    /// Fails with `AlreadyActive` while any session (including a failed
    /// one awaiting its stop) exists for the stream.
    #[instrument(skip_all, name = "bridge.manager.start", fields(stream_id = %stream_id))]
    pub async fn start_session(&self, stream_id: StreamId) -> Result<SessionInfo, BridgeError> {
        {
            let mut sessions = self.sessions.lock().await;
            if sessions.contains_key(&stream_id) {
                return Err(BridgeError::AlreadyActive(stream_id.to_string()));
            }
            sessions.insert(stream_id, SessionSlot::Pending);
        }

        // Reserve the bridge. On failure nothing was provisioned and the
        // slot is released: retrying immediately is safe.
        let grant = match self.client.start_bridge(stream_id).await {
            Ok(grant) => grant,
            Err(e) => {
                self.sessions.lock().await.remove(&stream_id);
                return Err(e);
            }
        };

        let peer = match self.peers.create_peer() {
            Ok(peer) => peer,
            Err(e) => {
                // Local failure after reservation; release the bridge
                // ourselves so the caller keeps the retry-immediately
                // contract of a start failure.
                self.sessions.lock().await.remove(&stream_id);
                self.spawn_remote_stop(grant.bridge_id);
                return Err(BridgeError::StartFailed(e.to_string()));
            }
        };

        // Whole negotiation runs under one deadline: offer creation, the
        // exchange round trip, and setting the remote description.
        let negotiation = async {
            let offer = peer.create_offer().await?;
            let answer = self.client.exchange_sdp(&grant.endpoint, &offer).await?;
            peer.set_remote_answer(&answer).await
        };
        let negotiated = match tokio::time::timeout(self.config.negotiation_timeout, negotiation)
            .await
        {
            Ok(result) => result,
            Err(_) => Err(BridgeError::Timeout(format!(
                "negotiation exceeded {:?}",
                self.config.negotiation_timeout
            ))),
        };

        let status = match &negotiated {
            Ok(()) => BridgeStatus::Connecting,
            Err(_) => {
                // The bridge is reserved but unconnected. Local media is
                // released now; the remote bridge is held until the
                // caller's explicit stop.
                peer.close();
                BridgeStatus::Failed
            }
        };

        let session_status = Arc::new(StdMutex::new(status));
        let session = Session {
            bridge_id: grant.bridge_id.clone(),
            peer: peer.clone(),
            status: session_status.clone(),
        };
        {
            let mut sessions = self.sessions.lock().await;
            match sessions.get(&stream_id) {
                Some(SessionSlot::Pending) => {
                    sessions.insert(stream_id, SessionSlot::Active(session));
                }
                _ => {
                    // Stopped (or raced) during negotiation: tear down
                    // everything we created.
                    peer.close();
                    self.spawn_remote_stop(grant.bridge_id);
                    return Err(BridgeError::Internal(
                        "session stopped during negotiation".to_string(),
                    ));
                }
            }
        }

        match negotiated {
            Ok(()) => {
                self.spawn_watcher(stream_id, &peer, session_status);
                info!(target: "bridge.manager", stream_id = %stream_id, "Bridge session negotiating done, connecting");
                Ok(SessionInfo {
                    bridge_id: grant.bridge_id,
                    status: BridgeStatus::Connecting,
                })
            }
            Err(e) => {
                warn!(target: "bridge.manager", stream_id = %stream_id, error = %e, "Bridge negotiation failed");
                Err(e)
            }
        }
    }

    /// Stop a session. Idempotent: stopping an unknown stream succeeds.
    ///
    /// Local media resources are closed synchronously before this
    /// returns; the remote stop runs asynchronously and best-effort.
    #[instrument(skip_all, name = "bridge.manager.stop", fields(stream_id = %stream_id))]
    pub async fn stop_session(&self, stream_id: StreamId) {
        let slot = self.sessions.lock().await.remove(&stream_id);
        match slot {
            None => debug!(target: "bridge.manager", "Stop for unknown session is a no-op"),
            Some(SessionSlot::Pending) => {
                // The in-flight start observes the missing slot and
                // cleans up after itself.
                debug!(target: "bridge.manager", "Stop raced an in-flight start");
            }
            Some(SessionSlot::Active(session)) => {
                session.peer.close();
                write_status(&session.status, BridgeStatus::Disconnected);
                self.spawn_remote_stop(session.bridge_id);
                info!(target: "bridge.manager", "Bridge session stopped");
            }
        }
    }

    /// Status of the session for a stream, if one exists.
    pub async fn session_info(&self, stream_id: StreamId) -> Option<SessionInfo> {
        let sessions = self.sessions.lock().await;
        match sessions.get(&stream_id) {
            Some(SessionSlot::Active(session)) => Some(SessionInfo {
                bridge_id: session.bridge_id.clone(),
                status: read_status(&session.status),
            }),
            _ => None,
        }
    }

    /// Stop every session and cancel the watchers.
    pub async fn shutdown(&self) {
        info!(target: "bridge.manager", "Shutting down bridge sessions");
        self.cancel_token.cancel();
        let stream_ids: Vec<StreamId> = self.sessions.lock().await.keys().copied().collect();
        for stream_id in stream_ids {
            self.stop_session(stream_id).await;
        }
    }

    /// Release a remote bridge without blocking the caller.
    fn spawn_remote_stop(&self, bridge_id: String) {
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.stop_bridge(&bridge_id).await {
                warn!(
                    target: "bridge.manager",
                    bridge_id = %bridge_id,
                    error = %e,
                    "Remote bridge release failed"
                );
            }
        });
    }

    /// Track peer connection-state changes and report them upward.
    ///
    /// A session that never reaches `Connected` before the connect
    /// deadline is failed: callers always get a terminal status within
    /// a bounded interval.
    fn spawn_watcher(
        &self,
        stream_id: StreamId,
        peer: &Arc<dyn MediaPeer>,
        status: Arc<StdMutex<BridgeStatus>>,
    ) {
        let mut states = peer.state_changes();
        let observer = self.observer.clone();
        let cancel_token = self.cancel_token.child_token();
        let connect_timeout = self.config.connect_timeout;

        tokio::spawn(async move {
            let deadline = tokio::time::sleep(connect_timeout);
            tokio::pin!(deadline);
            let mut connected = false;

            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => break,
                    () = &mut deadline, if !connected => {
                        warn!(
                            target: "bridge.manager",
                            stream_id = %stream_id,
                            "Session never connected before the deadline"
                        );
                        write_status(&status, BridgeStatus::Failed);
                        observer.ingest_failed(stream_id, true).await;
                        break;
                    }
                    changed = states.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = *states.borrow();
                        match state {
                            PeerConnectionState::Connected => {
                                connected = true;
                                write_status(&status, BridgeStatus::Connected);
                                observer.ingest_connected(stream_id).await;
                            }
                            PeerConnectionState::Failed => {
                                write_status(&status, BridgeStatus::Failed);
                                observer.ingest_failed(stream_id, true).await;
                                break;
                            }
                            PeerConnectionState::Closed => break,
                            PeerConnectionState::New | PeerConnectionState::Connecting => {}
                        }
                    }
                }
            }
            debug!(target: "bridge.manager", stream_id = %stream_id, "Session watcher stopped");
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::client::mock::MockBridgeClient;
    use crate::observer::mock::{RecordingObserver, Report};
    use crate::peer::mock::MockPeerFactory;

    struct Fixture {
        manager: BridgeSessionManager,
        client: Arc<MockBridgeClient>,
        peers: Arc<MockPeerFactory>,
        observer: Arc<RecordingObserver>,
    }

    fn fixture() -> Fixture {
        let client = Arc::new(MockBridgeClient::new());
        let peers = Arc::new(MockPeerFactory::new());
        let observer = Arc::new(RecordingObserver::new());
        let vars = HashMap::from([
            (
                "BRIDGE_BASE_URL".to_string(),
                "https://bridge.example.com/v1".to_string(),
            ),
            ("BRIDGE_API_TOKEN".to_string(), "token".to_string()),
        ]);
        let manager = BridgeSessionManager::new(
            client.clone(),
            peers.clone(),
            observer.clone(),
            BridgeConfig::from_vars(&vars).unwrap(),
        );
        Fixture {
            manager,
            client,
            peers,
            observer,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_negotiates_and_connects() {
        let f = fixture();
        let stream_id = StreamId::new();

        let info = f.manager.start_session(stream_id).await.unwrap();
        assert_eq!(info.status, BridgeStatus::Connecting);
        assert_eq!(f.client.exchange_count(), 1);

        // The answer reached the peer.
        let peer = f.peers.peer(0).unwrap();
        assert_eq!(peer.answers(), vec!["v=0 answer".to_string()]);

        // ICE completes; the observer hears about it.
        peer.set_state(PeerConnectionState::Connected);
        tokio::task::yield_now().await;

        let info = f.manager.session_info(stream_id).await.unwrap();
        assert_eq!(info.status, BridgeStatus::Connected);
        assert_eq!(f.observer.reports(), vec![Report::Connected(stream_id)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_already_active() {
        let f = fixture();
        let stream_id = StreamId::new();

        f.manager.start_session(stream_id).await.unwrap();
        let err = f.manager.start_session(stream_id).await.unwrap_err();
        assert!(matches!(err, BridgeError::AlreadyActive(_)));
        assert_eq!(f.client.start_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_reserves_nothing_and_retries() {
        let f = fixture();
        let stream_id = StreamId::new();

        f.client.fail_start(true);
        let err = f.manager.start_session(stream_id).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(f.manager.session_info(stream_id).await.is_none());
        assert_eq!(f.client.stop_count(), 0);

        // Immediate retry succeeds without any stop in between.
        f.client.fail_start(false);
        f.manager.start_session(stream_id).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_negotiation_blocks_until_explicit_stop() {
        let f = fixture();
        let stream_id = StreamId::new();

        f.client.fail_exchange(true);
        let err = f.manager.start_session(stream_id).await.unwrap_err();
        assert!(err.requires_stop());

        // Local media was released immediately.
        assert!(f.peers.peer(0).unwrap().is_closed());
        // The reserved bridge still blocks a new start.
        let err = f.manager.start_session(stream_id).await.unwrap_err();
        assert!(matches!(err, BridgeError::AlreadyActive(_)));

        // Explicit stop releases the bridge, then a fresh start works.
        f.manager.stop_session(stream_id).await;
        tokio::task::yield_now().await;
        assert_eq!(f.client.stop_count(), 1);

        f.client.fail_exchange(false);
        f.manager.start_session(stream_id).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_negotiation_deadline_enforced() {
        let f = fixture();
        let stream_id = StreamId::new();

        f.client.hang_exchange(true);
        let err = f.manager.start_session(stream_id).await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout(_)));
        assert!(err.requires_stop());

        let info = f.manager.session_info(stream_id).await.unwrap();
        assert_eq!(info.status, BridgeStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_deadline_fails_stalled_session() {
        let f = fixture();
        let stream_id = StreamId::new();

        f.manager.start_session(stream_id).await.unwrap();
        // Let the watcher task arm its deadline before moving the clock.
        tokio::task::yield_now().await;
        // ICE never completes; the deadline (30s default) fires.
        tokio::time::advance(std::time::Duration::from_secs(31)).await;
        tokio::task::yield_now().await;

        let info = f.manager.session_info(stream_id).await.unwrap();
        assert_eq!(info.status, BridgeStatus::Failed);
        assert_eq!(f.observer.reports(), vec![Report::Failed(stream_id, true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_failure_reported_as_fatal() {
        let f = fixture();
        let stream_id = StreamId::new();

        f.manager.start_session(stream_id).await.unwrap();
        let peer = f.peers.peer(0).unwrap();
        peer.set_state(PeerConnectionState::Connected);
        tokio::task::yield_now().await;
        peer.set_state(PeerConnectionState::Failed);
        tokio::task::yield_now().await;

        let info = f.manager.session_info(stream_id).await.unwrap();
        assert_eq!(info.status, BridgeStatus::Failed);
        assert_eq!(
            f.observer.reports(),
            vec![
                Report::Connected(stream_id),
                Report::Failed(stream_id, true)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_closes_locally() {
        let f = fixture();
        let stream_id = StreamId::new();

        f.manager.start_session(stream_id).await.unwrap();
        f.manager.stop_session(stream_id).await;

        // Local close happened synchronously.
        assert!(f.peers.peer(0).unwrap().is_closed());
        assert!(f.manager.session_info(stream_id).await.is_none());

        // Stopping again, and stopping a stream that never started, are
        // both no-ops.
        f.manager.stop_session(stream_id).await;
        f.manager.stop_session(StreamId::new()).await;

        tokio::task::yield_now().await;
        assert_eq!(f.client.stop_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_every_session() {
        let f = fixture();
        let a = StreamId::new();
        let b = StreamId::new();
        f.manager.start_session(a).await.unwrap();
        f.manager.start_session(b).await.unwrap();

        f.manager.shutdown().await;
        tokio::task::yield_now().await;

        assert!(f.manager.session_info(a).await.is_none());
        assert!(f.manager.session_info(b).await.is_none());
        assert_eq!(f.client.stop_count(), 2);
        assert!(f.peers.peer(0).unwrap().is_closed());
        assert!(f.peers.peer(1).unwrap().is_closed());
    }
}
