//! `StreamActor` - per-stream actor that owns one broadcast resource.
//!
//! Each `StreamActor`:
//! - Serializes every mutation of its resource through one mailbox
//! - Drives the lifecycle state machine (start, stop, bridge events)
//! - Runs the bounded recording readiness poll after a broadcast ends
//! - Auto-promotes a scheduled stream once its start time is reached
//!
//! The actor never mutates state another actor owns; cross-resource
//! coordination goes through the supervisor.

use crate::config::BroadcastConfig;
use crate::errors::BroadcastError;
use crate::models::{
    BroadcastResource, DesiredStream, RecordingSession, RecordingSessionStatus, StreamStatus,
};
use crate::platform::{AssetStatus, LiveVideoPlatform};
use crate::store::DocumentStore;

use chrono::Utc;
use common::secret::SecretString;
use common::types::StreamId;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Channel buffer size for the stream mailbox.
const STREAM_CHANNEL_BUFFER: usize = 64;

/// Ingest credentials handed to the caller when a broadcast starts.
#[derive(Debug, Clone)]
pub struct StartInfo {
    pub ingest_url: String,
    /// Redacted in Debug output.
    pub stream_key: SecretString,
    pub playback_url: String,
}

/// Connectivity events reported by the ingest path (RTMP or bridge).
#[derive(Debug, Clone, Copy)]
pub enum BridgeEvent {
    /// Media is flowing; the stream is live.
    Connected,
    /// The ingest path failed. `fatal` marks unrecoverable negotiation
    /// failures; non-fatal failures leave the stream startable again at
    /// the ingest layer.
    Failed { fatal: bool },
}

/// Messages handled by a `StreamActor`.
enum StreamMessage {
    Start {
        respond_to: oneshot::Sender<Result<StartInfo, BroadcastError>>,
    },
    Stop {
        respond_to: oneshot::Sender<Result<(), BroadcastError>>,
    },
    Promote {
        respond_to: oneshot::Sender<Result<(), BroadcastError>>,
    },
    GetState {
        respond_to: oneshot::Sender<Result<BroadcastResource, BroadcastError>>,
    },
    BridgeEvent {
        event: BridgeEvent,
    },
    ApplyUpdate {
        desired: Box<DesiredStream>,
        respond_to: oneshot::Sender<Result<(), BroadcastError>>,
    },
    Delete {
        respond_to: oneshot::Sender<Result<(), BroadcastError>>,
    },
}

/// Handle to a `StreamActor`.
#[derive(Clone)]
pub struct StreamActorHandle {
    sender: mpsc::Sender<StreamMessage>,
    cancel_token: CancellationToken,
    stream_id: StreamId,
}

impl StreamActorHandle {
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Whether the actor has shut down.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Start the broadcast. Requires the resource to be `Ready`.
    pub async fn start(&self) -> Result<StartInfo, BroadcastError> {
        self.request(|tx| StreamMessage::Start { respond_to: tx })
            .await?
    }

    /// Stop the broadcast. Idempotent once the stream has left `Live`.
    pub async fn stop(&self) -> Result<(), BroadcastError> {
        self.request(|tx| StreamMessage::Stop { respond_to: tx })
            .await?
    }

    /// Promote a scheduled stream to `Ready` ahead of its start time.
    pub async fn promote(&self) -> Result<(), BroadcastError> {
        self.request(|tx| StreamMessage::Promote { respond_to: tx })
            .await?
    }

    /// Current resource state.
    pub async fn get_state(&self) -> Result<BroadcastResource, BroadcastError> {
        self.request(|tx| StreamMessage::GetState { respond_to: tx })
            .await?
    }

    /// Report an ingest connectivity event. Fire-and-forget.
    pub async fn bridge_event(&self, event: BridgeEvent) -> Result<(), BroadcastError> {
        self.sender
            .send(StreamMessage::BridgeEvent { event })
            .await
            .map_err(|e| BroadcastError::Internal(format!("channel send failed: {e}")))
    }

    /// Apply a schedule-derived update to the resource.
    pub async fn apply_update(&self, desired: DesiredStream) -> Result<(), BroadcastError> {
        self.request(|tx| StreamMessage::ApplyUpdate {
            desired: Box::new(desired),
            respond_to: tx,
        })
        .await?
    }

    /// Delete the resource and shut the actor down. Refused while the
    /// stream is active.
    pub async fn delete(&self) -> Result<(), BroadcastError> {
        self.request(|tx| StreamMessage::Delete { respond_to: tx })
            .await?
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> StreamMessage,
    ) -> Result<T, BroadcastError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|e| BroadcastError::Internal(format!("channel send failed: {e}")))?;
        rx.await
            .map_err(|e| BroadcastError::Internal(format!("response receive failed: {e}")))
    }
}

/// Per-stream actor owning one broadcast resource.
pub struct StreamActor {
    stream_id: StreamId,
    store: Arc<dyn DocumentStore>,
    platform: Arc<dyn LiveVideoPlatform>,
    config: BroadcastConfig,
    receiver: mpsc::Receiver<StreamMessage>,
    cancel_token: CancellationToken,
    /// Recording poll attempts made since the stream entered `Ending`.
    poll_attempts: u32,
}

impl StreamActor {
    /// Spawn an actor for `stream_id` and return its handle.
    pub fn spawn(
        stream_id: StreamId,
        store: Arc<dyn DocumentStore>,
        platform: Arc<dyn LiveVideoPlatform>,
        config: BroadcastConfig,
        parent_token: &CancellationToken,
    ) -> StreamActorHandle {
        let (sender, receiver) = mpsc::channel(STREAM_CHANNEL_BUFFER);
        let cancel_token = parent_token.child_token();

        let actor = StreamActor {
            stream_id,
            store,
            platform,
            config,
            receiver,
            cancel_token: cancel_token.clone(),
            poll_attempts: 0,
        };
        tokio::spawn(actor.run());

        StreamActorHandle {
            sender,
            cancel_token,
            stream_id,
        }
    }

    #[instrument(skip_all, name = "broadcast.stream.run", fields(stream_id = %self.stream_id))]
    async fn run(mut self) {
        debug!(target: "broadcast.stream", "Stream actor started");
        let mut tick = tokio::time::interval(self.config.recording_poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "broadcast.stream", "Stream actor cancelled");
                    break;
                }
                msg = self.receiver.recv() => {
                    match msg {
                        Some(msg) => self.handle_message(msg).await,
                        None => break,
                    }
                }
                _ = tick.tick() => {
                    self.on_tick().await;
                }
            }
        }
        debug!(target: "broadcast.stream", "Stream actor stopped");
    }

    async fn handle_message(&mut self, msg: StreamMessage) {
        match msg {
            StreamMessage::Start { respond_to } => {
                let _ = respond_to.send(self.handle_start().await);
            }
            StreamMessage::Stop { respond_to } => {
                let _ = respond_to.send(self.handle_stop().await);
            }
            StreamMessage::Promote { respond_to } => {
                let _ = respond_to.send(self.handle_promote().await);
            }
            StreamMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.load().await);
            }
            StreamMessage::BridgeEvent { event } => {
                self.handle_bridge_event(event).await;
            }
            StreamMessage::ApplyUpdate {
                desired,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_apply_update(*desired).await);
            }
            StreamMessage::Delete { respond_to } => {
                let result = self.handle_delete().await;
                let deleted = result.is_ok();
                let _ = respond_to.send(result);
                if deleted {
                    self.cancel_token.cancel();
                }
            }
        }
    }

    async fn load(&self) -> Result<BroadcastResource, BroadcastError> {
        self.store
            .get_stream(self.stream_id)
            .await?
            .ok_or_else(|| BroadcastError::NotFound(format!("stream {}", self.stream_id)))
    }

    async fn persist(&self, mut resource: BroadcastResource) -> Result<(), BroadcastError> {
        resource.updated_at = Utc::now();
        self.store.put_stream(&resource).await
    }

    /// Provision the live input, then transition `Ready` -> `Connecting`.
    ///
    /// Provisioning happens before the transition so a platform failure
    /// leaves the resource `Ready` and the operation retryable.
    #[instrument(skip_all, name = "broadcast.stream.start", fields(stream_id = %self.stream_id))]
    async fn handle_start(&mut self) -> Result<StartInfo, BroadcastError> {
        let mut resource = self.load().await?;

        match resource.status {
            StreamStatus::Ready => {}
            StreamStatus::Connecting | StreamStatus::Live => {
                return Err(BroadcastError::Conflict(
                    "stream is already active".to_string(),
                ));
            }
            other => {
                return Err(BroadcastError::Conflict(format!(
                    "stream cannot start from {other:?}"
                )));
            }
        }

        let input = self
            .platform
            .create_live_input(&resource.title, &self.config.recording_mode)
            .await?;

        use common::secret::ExposeSecret;
        resource.status = StreamStatus::Connecting;
        resource.external_media_id = Some(input.id.clone());
        resource.stream_key = Some(input.credentials.stream_key.expose_secret().to_string());
        resource.playback_url = Some(input.playback_ref.clone());
        self.persist(resource).await?;

        info!(
            target: "broadcast.stream",
            external_media_id = %input.id,
            "Broadcast starting"
        );
        Ok(StartInfo {
            ingest_url: input.credentials.ingest_url,
            stream_key: input.credentials.stream_key,
            playback_url: input.playback_ref,
        })
    }

    /// Transition `Live` -> `Ending` and begin the recording poll.
    ///
    /// Idempotent once the stream has left `Live`: stopping an `Ending`
    /// or `Completed` stream is a no-op.
    #[instrument(skip_all, name = "broadcast.stream.stop", fields(stream_id = %self.stream_id))]
    async fn handle_stop(&mut self) -> Result<(), BroadcastError> {
        let mut resource = self.load().await?;

        match resource.status {
            StreamStatus::Live => {}
            StreamStatus::Ending | StreamStatus::Completed => {
                debug!(target: "broadcast.stream", status = ?resource.status, "Stop is a no-op");
                return Ok(());
            }
            other => {
                return Err(BroadcastError::Conflict(format!(
                    "stream cannot stop from {other:?}"
                )));
            }
        }

        let now = Utc::now();
        resource.end_time = Some(now);

        // Tear the live input down; the recorded asset outlives it.
        // Failure here is logged, not surfaced: the broadcast has ended
        // either way.
        if let Some(external_media_id) = resource.external_media_id.clone() {
            if let Err(e) = self.platform.delete_live_input(&external_media_id).await {
                warn!(
                    target: "broadcast.stream",
                    error = %e,
                    "Live input teardown failed"
                );
            }

            resource.recording_sessions.push(RecordingSession {
                session_id: Uuid::new_v4().to_string(),
                external_media_id,
                start_time: resource.actual_start.unwrap_or(now),
                end_time: Some(now),
                duration_seconds: None,
                status: RecordingSessionStatus::Processing,
                recording_url: None,
                thumbnail_url: None,
            });
            resource.status = StreamStatus::Ending;
            self.poll_attempts = 0;
            info!(target: "broadcast.stream", "Broadcast ended, awaiting recording");
        } else {
            // Nothing was ever provisioned; there is no recording to wait
            // for.
            resource.status = StreamStatus::Ending;
            self.persist(resource).await?;
            return self.complete(None).await;
        }

        self.persist(resource).await
    }

    async fn handle_promote(&mut self) -> Result<(), BroadcastError> {
        let mut resource = self.load().await?;
        match resource.status {
            StreamStatus::Scheduled => {
                resource.status = StreamStatus::Ready;
                self.persist(resource).await?;
                info!(target: "broadcast.stream", stream_id = %self.stream_id, "Stream promoted to ready");
                Ok(())
            }
            StreamStatus::Ready => Ok(()),
            other => Err(BroadcastError::Conflict(format!(
                "stream cannot be promoted from {other:?}"
            ))),
        }
    }

    async fn handle_bridge_event(&mut self, event: BridgeEvent) {
        let result = match event {
            BridgeEvent::Connected => self.handle_connected().await,
            BridgeEvent::Failed { fatal } => self.handle_ingest_failure(fatal).await,
        };
        if let Err(e) = result {
            warn!(
                target: "broadcast.stream",
                stream_id = %self.stream_id,
                error = %e,
                "Failed to apply ingest event"
            );
        }
    }

    async fn handle_connected(&mut self) -> Result<(), BroadcastError> {
        let mut resource = self.load().await?;
        if resource.status != StreamStatus::Connecting {
            debug!(
                target: "broadcast.stream",
                status = ?resource.status,
                "Ignoring connect event outside Connecting"
            );
            return Ok(());
        }
        resource.status = StreamStatus::Live;
        resource.actual_start = Some(Utc::now());
        self.persist(resource).await?;
        info!(target: "broadcast.stream", stream_id = %self.stream_id, "Broadcast live");
        Ok(())
    }

    async fn handle_ingest_failure(&mut self, fatal: bool) -> Result<(), BroadcastError> {
        let mut resource = self.load().await?;
        if !fatal {
            // Recoverable: the ingest layer retries, the resource state
            // is unchanged.
            warn!(
                target: "broadcast.stream",
                stream_id = %self.stream_id,
                status = ?resource.status,
                "Recoverable ingest failure"
            );
            return Ok(());
        }
        if resource.status.is_terminal() {
            return Ok(());
        }
        resource.status = StreamStatus::Error;
        self.persist(resource).await?;
        warn!(target: "broadcast.stream", stream_id = %self.stream_id, "Stream failed");
        Ok(())
    }

    async fn handle_apply_update(&mut self, desired: DesiredStream) -> Result<(), BroadcastError> {
        let mut resource = self.load().await?;
        resource.title = desired.title;
        resource.description = desired.description;
        resource.scheduled_start = desired.scheduled_start;
        resource.service_hash = Some(desired.content_hash);
        resource.last_synced_at = Some(Utc::now());
        self.persist(resource).await
    }

    async fn handle_delete(&mut self) -> Result<(), BroadcastError> {
        let resource = self.load().await?;
        if matches!(
            resource.status,
            StreamStatus::Connecting | StreamStatus::Live | StreamStatus::Ending
        ) {
            return Err(BroadcastError::Conflict(
                "stream is active and cannot be deleted".to_string(),
            ));
        }
        self.store.delete_stream(self.stream_id).await?;
        info!(target: "broadcast.stream", stream_id = %self.stream_id, "Stream deleted");
        Ok(())
    }

    /// Periodic work: auto-promotion and the recording readiness poll.
    async fn on_tick(&mut self) {
        let resource = match self.load().await {
            Ok(resource) => resource,
            Err(BroadcastError::NotFound(_)) => return,
            Err(e) => {
                warn!(
                    target: "broadcast.stream",
                    stream_id = %self.stream_id,
                    error = %e,
                    "Tick load failed"
                );
                return;
            }
        };

        match resource.status {
            StreamStatus::Scheduled => {
                let due = resource
                    .scheduled_start
                    .is_some_and(|start| start <= Utc::now());
                if due {
                    if let Err(e) = self.handle_promote().await {
                        warn!(
                            target: "broadcast.stream",
                            stream_id = %self.stream_id,
                            error = %e,
                            "Auto-promotion failed"
                        );
                    }
                }
            }
            StreamStatus::Ending => self.poll_recording(resource).await,
            _ => {}
        }
    }

    /// One bounded recording readiness poll attempt.
    async fn poll_recording(&mut self, resource: BroadcastResource) {
        let Some(external_media_id) = resource.external_media_id.clone() else {
            if let Err(e) = self.complete(None).await {
                warn!(target: "broadcast.stream", error = %e, "Completion failed");
            }
            return;
        };

        self.poll_attempts += 1;
        debug!(
            target: "broadcast.stream",
            stream_id = %self.stream_id,
            attempt = self.poll_attempts,
            "Polling recording readiness"
        );

        let result = match self.platform.get_asset(&external_media_id).await {
            Ok(asset) => match asset.status {
                AssetStatus::Ready if asset.playback_ref.is_some() => {
                    self.complete(Some(asset)).await
                }
                AssetStatus::Ready => {
                    // A ready asset without a playback reference can never
                    // be marked recording-ready; complete without one.
                    warn!(
                        target: "broadcast.stream",
                        stream_id = %self.stream_id,
                        "Recording ready without a playback reference"
                    );
                    self.complete(None).await
                }
                AssetStatus::Errored => {
                    warn!(
                        target: "broadcast.stream",
                        stream_id = %self.stream_id,
                        "Recording failed on the platform"
                    );
                    self.complete(None).await
                }
                AssetStatus::Processing => {
                    if self.poll_attempts >= self.config.recording_poll_max_attempts {
                        warn!(
                            target: "broadcast.stream",
                            stream_id = %self.stream_id,
                            attempts = self.poll_attempts,
                            "Recording poll budget exhausted"
                        );
                        self.complete(None).await
                    } else {
                        Ok(())
                    }
                }
            },
            Err(e) => {
                // Transient platform failures consume an attempt but do
                // not fail the stream.
                warn!(
                    target: "broadcast.stream",
                    stream_id = %self.stream_id,
                    error = %e,
                    "Recording poll attempt failed"
                );
                if self.poll_attempts >= self.config.recording_poll_max_attempts {
                    self.complete(None).await
                } else {
                    Ok(())
                }
            }
        };

        if let Err(e) = result {
            warn!(
                target: "broadcast.stream",
                stream_id = %self.stream_id,
                error = %e,
                "Completion failed"
            );
        }
    }

    /// Transition `Ending` -> `Completed`, with or without a recording.
    async fn complete(
        &mut self,
        asset: Option<crate::platform::AssetInfo>,
    ) -> Result<(), BroadcastError> {
        let mut resource = self.load().await?;
        if resource.status != StreamStatus::Ending {
            return Ok(());
        }

        match asset {
            Some(asset) => {
                resource.recording_ready = true;
                resource.recording_url = asset.playback_ref.clone();
                if let Some(session) = resource.recording_sessions.last_mut() {
                    session.status = RecordingSessionStatus::Ready;
                    session.recording_url = asset.playback_ref;
                    session.thumbnail_url = asset.thumbnail_ref;
                    session.duration_seconds = asset.duration_seconds;
                }
                info!(target: "broadcast.stream", stream_id = %self.stream_id, "Recording ready");
            }
            None => {
                if let Some(session) = resource.recording_sessions.last_mut() {
                    session.status = RecordingSessionStatus::Failed;
                }
                info!(
                    target: "broadcast.stream",
                    stream_id = %self.stream_id,
                    "Completed without recording"
                );
            }
        }

        resource.status = StreamStatus::Completed;
        self.persist(resource).await
    }
}
