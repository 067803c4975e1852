//! `BroadcastSupervisor` - owns the stream actor registry and the
//! access-gated public surface.
//!
//! One actor per stream id, spawned on demand and reaped once cancelled.
//! Every externally triggered mutation passes through the resolver before
//! it reaches an actor; internal paths (reconciliation, ingest callbacks)
//! enter below the gate.

use crate::actors::stream::{BridgeEvent, StartInfo, StreamActor, StreamActorHandle};
use crate::config::BroadcastConfig;
use crate::errors::BroadcastError;
use crate::models::{BroadcastResource, DesiredStream, StreamStatus};
use crate::platform::LiveVideoPlatform;
use crate::store::DocumentStore;

use access_control::models::{AccessDecision, AccessLevel, Action, Principal};
use access_control::resolver::resolve;
use access_control::store::{GrantStore, SnapshotLoader};
use chrono::{DateTime, Utc};
use common::types::{MemorialId, StreamId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Parameters for manually creating a stream.
#[derive(Debug, Clone)]
pub struct NewStream {
    pub title: String,
    pub description: Option<String>,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub is_visible: bool,
    pub is_public: bool,
}

/// Supervisor owning all stream actors and the access-gated surface.
pub struct BroadcastSupervisor {
    store: Arc<dyn DocumentStore>,
    platform: Arc<dyn LiveVideoPlatform>,
    grants: Arc<dyn GrantStore>,
    config: BroadcastConfig,
    actors: Mutex<HashMap<StreamId, StreamActorHandle>>,
    cancel_token: CancellationToken,
}

impl BroadcastSupervisor {
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        platform: Arc<dyn LiveVideoPlatform>,
        grants: Arc<dyn GrantStore>,
        config: BroadcastConfig,
    ) -> Self {
        Self {
            store,
            platform,
            grants,
            config,
            actors: Mutex::new(HashMap::new()),
            cancel_token: CancellationToken::new(),
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Shut down every stream actor.
    pub fn shutdown(&self) {
        info!(target: "broadcast.supervisor", "Shutting down stream actors");
        self.cancel_token.cancel();
    }

    /// Start a broadcast. Requires broadcast control on the memorial.
    #[instrument(skip_all, name = "broadcast.supervisor.start", fields(stream_id = %stream_id, user_id = %principal.id))]
    pub async fn start_stream(
        &self,
        principal: &Principal,
        stream_id: StreamId,
    ) -> Result<StartInfo, BroadcastError> {
        let resource = self.load(stream_id).await?;
        self.authorize(principal, &resource, Action::ControlBroadcast)
            .await?;
        self.handle(stream_id).await?.start().await
    }

    /// Stop a broadcast. Requires broadcast control on the memorial.
    #[instrument(skip_all, name = "broadcast.supervisor.stop", fields(stream_id = %stream_id, user_id = %principal.id))]
    pub async fn stop_stream(
        &self,
        principal: &Principal,
        stream_id: StreamId,
    ) -> Result<(), BroadcastError> {
        let resource = self.load(stream_id).await?;
        self.authorize(principal, &resource, Action::ControlBroadcast)
            .await?;
        self.handle(stream_id).await?.stop().await
    }

    /// Promote a scheduled stream to ready ahead of its start time.
    pub async fn promote_stream(
        &self,
        principal: &Principal,
        stream_id: StreamId,
    ) -> Result<(), BroadcastError> {
        let resource = self.load(stream_id).await?;
        self.authorize(principal, &resource, Action::ControlBroadcast)
            .await?;
        self.handle(stream_id).await?.promote().await
    }

    /// Fetch one stream, subject to view access and visibility.
    pub async fn get_stream(
        &self,
        principal: &Principal,
        stream_id: StreamId,
    ) -> Result<BroadcastResource, BroadcastError> {
        let resource = self.load(stream_id).await?;
        let decision = self.authorize(principal, &resource, Action::View).await?;
        if !resource.is_visible && decision.level < AccessLevel::Edit {
            return Err(BroadcastError::NotFound(format!("stream {stream_id}")));
        }
        Ok(resource)
    }

    /// All streams of a memorial the principal may see. Hidden streams
    /// are included only at edit level and above.
    pub async fn list_streams(
        &self,
        principal: &Principal,
        memorial_id: MemorialId,
    ) -> Result<Vec<BroadcastResource>, BroadcastError> {
        let decision = self
            .authorize_memorial(principal, memorial_id, Action::View)
            .await?;
        let streams = self.store.streams_by_memorial(memorial_id).await?;
        Ok(streams
            .into_iter()
            .filter(|s| s.is_visible || decision.level >= AccessLevel::Edit)
            .collect())
    }

    /// Manually create a stream on a memorial. Requires edit access;
    /// manual streams are never touched by reconciliation.
    #[instrument(skip_all, name = "broadcast.supervisor.create", fields(memorial_id = %memorial_id, user_id = %principal.id))]
    pub async fn create_stream(
        &self,
        principal: &Principal,
        memorial_id: MemorialId,
        params: NewStream,
    ) -> Result<BroadcastResource, BroadcastError> {
        self.authorize_memorial(principal, memorial_id, Action::EditContent)
            .await?;

        let now = Utc::now();
        let resource = BroadcastResource {
            id: StreamId::new(),
            title: params.title,
            description: params.description,
            memorial_id: Some(memorial_id),
            external_media_id: None,
            stream_key: None,
            playback_url: None,
            status: StreamStatus::Scheduled,
            scheduled_start: params.scheduled_start,
            actual_start: None,
            end_time: None,
            recording_ready: false,
            recording_url: None,
            recording_sessions: Vec::new(),
            is_visible: params.is_visible,
            is_public: params.is_public,
            created_by: Some(principal.id),
            allowed_users: None,
            service_key: None,
            service_hash: None,
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.put_stream(&resource).await?;
        info!(target: "broadcast.supervisor", stream_id = %resource.id, "Stream created");
        Ok(resource)
    }

    /// Report an ingest connectivity event for a stream. Internal: the
    /// ingest path authenticated out of band.
    pub async fn bridge_event(
        &self,
        stream_id: StreamId,
        event: BridgeEvent,
    ) -> Result<(), BroadcastError> {
        self.handle(stream_id).await?.bridge_event(event).await
    }

    /// Apply a schedule-derived update. Reconciliation only.
    pub(crate) async fn apply_update(
        &self,
        stream_id: StreamId,
        desired: DesiredStream,
    ) -> Result<(), BroadcastError> {
        self.handle(stream_id).await?.apply_update(desired).await
    }

    /// Delete a schedule-managed stream. Reconciliation only; routed
    /// through the actor so active streams refuse.
    pub(crate) async fn delete_managed(&self, stream_id: StreamId) -> Result<(), BroadcastError> {
        self.handle(stream_id).await?.delete().await
    }

    /// Persist a new schedule-managed stream. Reconciliation only.
    pub(crate) async fn create_managed(
        &self,
        memorial_id: MemorialId,
        desired: &DesiredStream,
    ) -> Result<StreamId, BroadcastError> {
        let now = Utc::now();
        let resource = BroadcastResource {
            id: StreamId::new(),
            title: desired.title.clone(),
            description: desired.description.clone(),
            memorial_id: Some(memorial_id),
            external_media_id: None,
            stream_key: None,
            playback_url: None,
            status: StreamStatus::Scheduled,
            scheduled_start: desired.scheduled_start,
            actual_start: None,
            end_time: None,
            recording_ready: false,
            recording_url: None,
            recording_sessions: Vec::new(),
            is_visible: true,
            is_public: true,
            created_by: None,
            allowed_users: None,
            service_key: Some(desired.key),
            service_hash: Some(desired.content_hash.clone()),
            last_synced_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        self.store.put_stream(&resource).await?;
        Ok(resource.id)
    }

    /// Resolve the principal's access for an action on the memorial a
    /// stream belongs to. Streams detached from any memorial are
    /// admin-only.
    pub(crate) async fn authorize(
        &self,
        principal: &Principal,
        resource: &BroadcastResource,
        action: Action,
    ) -> Result<AccessDecision, BroadcastError> {
        match resource.memorial_id {
            Some(memorial_id) => self.authorize_memorial(principal, memorial_id, action).await,
            None => {
                if principal.has_admin_privileges() {
                    Ok(AccessDecision {
                        granted: true,
                        level: AccessLevel::Admin,
                        reason: "admin privileges",
                    })
                } else {
                    Err(BroadcastError::Unauthorized(
                        "insufficient permissions".to_string(),
                    ))
                }
            }
        }
    }

    pub(crate) async fn authorize_memorial(
        &self,
        principal: &Principal,
        memorial_id: MemorialId,
        action: Action,
    ) -> Result<AccessDecision, BroadcastError> {
        let memorial = self
            .store
            .get_memorial(memorial_id)
            .await?
            .ok_or_else(|| BroadcastError::NotFound(format!("memorial {memorial_id}")))?;

        let snapshot = SnapshotLoader::new(self.grants.as_ref())
            .load(&memorial.access_ref(), principal)
            .await
            .map_err(|e| BroadcastError::Storage(e.to_string()))?;

        let decision = resolve(principal, &snapshot, action);
        if decision.granted {
            debug!(
                target: "broadcast.supervisor",
                memorial_id = %memorial_id,
                user_id = %principal.id,
                reason = decision.reason,
                "Access granted"
            );
            Ok(decision)
        } else {
            Err(BroadcastError::Unauthorized(decision.reason.to_string()))
        }
    }

    async fn load(&self, stream_id: StreamId) -> Result<BroadcastResource, BroadcastError> {
        self.store
            .get_stream(stream_id)
            .await?
            .ok_or_else(|| BroadcastError::NotFound(format!("stream {stream_id}")))
    }

    /// Get or spawn the actor for a stream. Cancelled actors are reaped
    /// and respawned.
    async fn handle(&self, stream_id: StreamId) -> Result<StreamActorHandle, BroadcastError> {
        let mut actors = self.actors.lock().await;
        if let Some(handle) = actors.get(&stream_id) {
            if !handle.is_cancelled() {
                return Ok(handle.clone());
            }
            actors.remove(&stream_id);
        }

        let handle = StreamActor::spawn(
            stream_id,
            self.store.clone(),
            self.platform.clone(),
            self.config.clone(),
            &self.cancel_token,
        );
        actors.insert(stream_id, handle.clone());
        Ok(handle)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::MemorialDoc;
    use crate::platform::mock::MockPlatform;
    use crate::store::memory::InMemoryStore;
    use access_control::models::Role;
    use access_control::store::mock::MockGrantStore;
    use common::types::UserId;

    fn test_config() -> BroadcastConfig {
        let vars = HashMap::from([
            (
                "LIVE_PLATFORM_BASE_URL".to_string(),
                "https://video.example.com/v1".to_string(),
            ),
            ("LIVE_PLATFORM_API_TOKEN".to_string(), "token".to_string()),
        ]);
        BroadcastConfig::from_vars(&vars).unwrap()
    }

    fn principal(id: UserId, role: Role) -> Principal {
        Principal {
            id,
            email: "someone@example.com".to_string(),
            role,
            is_admin: false,
        }
    }

    struct Fixture {
        supervisor: BroadcastSupervisor,
        store: Arc<InMemoryStore>,
        owner: Principal,
        memorial_id: MemorialId,
    }

    async fn fixture() -> Fixture {
        fixture_with_grants(MockGrantStore::new()).await
    }

    async fn fixture_with_grants(grants: MockGrantStore) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let owner_id = UserId::new();
        let memorial_id = MemorialId::new();
        store
            .insert_memorial(MemorialDoc {
                id: memorial_id,
                owner_id,
                assigned_director_id: None,
                is_public: Some(true),
                schedule: Vec::new(),
            })
            .await;

        let supervisor = BroadcastSupervisor::new(
            store.clone(),
            Arc::new(MockPlatform::ready()),
            Arc::new(grants),
            test_config(),
        );
        Fixture {
            supervisor,
            store,
            owner: principal(owner_id, Role::Owner),
            memorial_id,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_owner_creates_promotes_and_starts() {
        let f = fixture().await;

        let stream = f
            .supervisor
            .create_stream(
                &f.owner,
                f.memorial_id,
                NewStream {
                    title: "Rose Hill Service".to_string(),
                    description: None,
                    scheduled_start: None,
                    is_visible: true,
                    is_public: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(stream.status, StreamStatus::Scheduled);
        assert!(!stream.is_schedule_managed());

        f.supervisor
            .promote_stream(&f.owner, stream.id)
            .await
            .unwrap();
        let info = f.supervisor.start_stream(&f.owner, stream.id).await.unwrap();
        assert!(!info.ingest_url.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_viewer_denied_broadcast_control() {
        let f = fixture().await;
        let stream = f
            .supervisor
            .create_stream(
                &f.owner,
                f.memorial_id,
                NewStream {
                    title: "t".to_string(),
                    description: None,
                    scheduled_start: None,
                    is_visible: true,
                    is_public: true,
                },
            )
            .await
            .unwrap();

        let viewer = principal(UserId::new(), Role::Viewer);
        let err = f
            .supervisor
            .start_stream(&viewer, stream.id)
            .await
            .unwrap_err();
        assert!(matches!(err, BroadcastError::Unauthorized(_)));
        // Denials are never retryable.
        assert!(!err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invited_family_member_edits_but_cannot_control() {
        use access_control::models::{InvitationGrant, InvitationStatus};

        let store = Arc::new(InMemoryStore::new());
        let owner_id = UserId::new();
        let memorial_id = MemorialId::new();
        store
            .insert_memorial(MemorialDoc {
                id: memorial_id,
                owner_id,
                assigned_director_id: None,
                is_public: Some(true),
                schedule: Vec::new(),
            })
            .await;

        let family = principal(UserId::new(), Role::FamilyMember);
        let grants = MockGrantStore::new().with_invitation(
            memorial_id,
            &family.email,
            InvitationGrant {
                status: InvitationStatus::Accepted,
                role_to_assign: Role::FamilyMember,
            },
        );
        let supervisor = BroadcastSupervisor::new(
            store,
            Arc::new(MockPlatform::ready()),
            Arc::new(grants),
            test_config(),
        );

        // Edit level: may create.
        let stream = supervisor
            .create_stream(
                &family,
                memorial_id,
                NewStream {
                    title: "t".to_string(),
                    description: None,
                    scheduled_start: None,
                    is_visible: true,
                    is_public: true,
                },
            )
            .await
            .unwrap();

        // But never control: the role gate overrides the level.
        let err = supervisor.start_stream(&family, stream.id).await.unwrap_err();
        assert!(matches!(err, BroadcastError::Unauthorized(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_stream_invisible_to_viewers() {
        let f = fixture().await;
        f.supervisor
            .create_stream(
                &f.owner,
                f.memorial_id,
                NewStream {
                    title: "hidden".to_string(),
                    description: None,
                    scheduled_start: None,
                    is_visible: false,
                    is_public: true,
                },
            )
            .await
            .unwrap();

        let viewer = principal(UserId::new(), Role::Viewer);
        let seen = f
            .supervisor
            .list_streams(&viewer, f.memorial_id)
            .await
            .unwrap();
        assert!(seen.is_empty());

        // The owner sees it.
        let seen = f
            .supervisor
            .list_streams(&f.owner, f.memorial_id)
            .await
            .unwrap();
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_stream_is_admin_only() {
        let f = fixture().await;
        let mut orphan = f
            .supervisor
            .create_stream(
                &f.owner,
                f.memorial_id,
                NewStream {
                    title: "orphan".to_string(),
                    description: None,
                    scheduled_start: None,
                    is_visible: true,
                    is_public: true,
                },
            )
            .await
            .unwrap();
        orphan.memorial_id = None;
        f.store.put_stream(&orphan).await.unwrap();

        let err = f
            .supervisor
            .promote_stream(&f.owner, orphan.id)
            .await
            .unwrap_err();
        assert!(matches!(err, BroadcastError::Unauthorized(_)));

        let admin = Principal {
            id: UserId::new(),
            email: "admin@example.com".to_string(),
            role: Role::Admin,
            is_admin: true,
        };
        f.supervisor.promote_stream(&admin, orphan.id).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_stream_is_not_found() {
        let f = fixture().await;
        let err = f
            .supervisor
            .start_stream(&f.owner, StreamId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BroadcastError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_starts_yield_single_live_input() {
        let platform = Arc::new(MockPlatform::ready());
        let store = Arc::new(InMemoryStore::new());
        let owner_id = UserId::new();
        let memorial_id = MemorialId::new();
        store
            .insert_memorial(MemorialDoc {
                id: memorial_id,
                owner_id,
                assigned_director_id: None,
                is_public: Some(true),
                schedule: Vec::new(),
            })
            .await;
        let supervisor = Arc::new(BroadcastSupervisor::new(
            store,
            platform.clone(),
            Arc::new(MockGrantStore::new()),
            test_config(),
        ));
        let owner = principal(owner_id, Role::Owner);

        let stream = supervisor
            .create_stream(
                &owner,
                memorial_id,
                NewStream {
                    title: "t".to_string(),
                    description: None,
                    scheduled_start: None,
                    is_visible: true,
                    is_public: true,
                },
            )
            .await
            .unwrap();
        supervisor.promote_stream(&owner, stream.id).await.unwrap();

        let a = {
            let supervisor = supervisor.clone();
            let owner = owner.clone();
            tokio::spawn(async move { supervisor.start_stream(&owner, stream.id).await })
        };
        let b = {
            let supervisor = supervisor.clone();
            let owner = owner.clone();
            tokio::spawn(async move { supervisor.start_stream(&owner, stream.id).await })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        // Exactly one start wins; the other sees a conflict. Both never
        // provision.
        assert!(a.is_ok() != b.is_ok());
        assert_eq!(platform.create_count(), 1);
    }
}
