//! Read-only invitation/follow store and snapshot assembly.
//!
//! The resolver never performs I/O; this module is the boundary that does.
//! `SnapshotLoader` combines the memorial's own fields with the two grant
//! store queries into one immutable [`AccessSnapshot`].

use crate::models::{AccessSnapshot, InvitationGrant, Principal};
use common::types::{MemorialId, UserId};
use thiserror::Error;

/// Grant store query failure.
#[derive(Debug, Error)]
pub enum GrantStoreError {
    #[error("Grant store error: {0}")]
    Backend(String),
}

/// The memorial fields the resolver needs, as read from the document store.
#[derive(Debug, Clone)]
pub struct MemorialRef {
    pub id: MemorialId,
    pub owner_id: UserId,
    pub assigned_director_id: Option<UserId>,
    pub is_public: Option<bool>,
}

/// Read-only queries against the invitation/follow store.
///
/// Implemented over the external store; mocked in tests.
#[async_trait::async_trait]
pub trait GrantStore: Send + Sync {
    /// Invitation for `(memorial, email)`, if one exists.
    async fn invitation(
        &self,
        memorial_id: MemorialId,
        email: &str,
    ) -> Result<Option<InvitationGrant>, GrantStoreError>;

    /// Whether `user_id` follows the memorial.
    async fn is_following(
        &self,
        memorial_id: MemorialId,
        user_id: UserId,
    ) -> Result<bool, GrantStoreError>;
}

/// Assembles access snapshots from a memorial and the grant store.
pub struct SnapshotLoader<'a> {
    store: &'a dyn GrantStore,
}

impl<'a> SnapshotLoader<'a> {
    #[must_use]
    pub fn new(store: &'a dyn GrantStore) -> Self {
        Self { store }
    }

    /// Build the snapshot for one `(principal, memorial)` pair.
    ///
    /// Both queries are scoped to the principal, so the snapshot carries
    /// exactly the grant sources the resolver's rules may consult.
    pub async fn load(
        &self,
        memorial: &MemorialRef,
        principal: &Principal,
    ) -> Result<AccessSnapshot, GrantStoreError> {
        let invitation = self.store.invitation(memorial.id, &principal.email).await?;
        let is_follower = self.store.is_following(memorial.id, principal.id).await?;

        Ok(AccessSnapshot {
            memorial_id: memorial.id,
            owner_id: memorial.owner_id,
            assigned_director_id: memorial.assigned_director_id,
            is_public: memorial.is_public,
            invitation,
            is_follower,
        })
    }
}

/// Mock grant store for testing.
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory grant store with call counting.
    #[derive(Default)]
    pub struct MockGrantStore {
        invitations: HashMap<(MemorialId, String), InvitationGrant>,
        followers: HashSet<(MemorialId, UserId)>,
        query_count: AtomicUsize,
    }

    impl MockGrantStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_invitation(
            mut self,
            memorial_id: MemorialId,
            email: &str,
            grant: InvitationGrant,
        ) -> Self {
            self.invitations
                .insert((memorial_id, email.to_string()), grant);
            self
        }

        pub fn with_follower(mut self, memorial_id: MemorialId, user_id: UserId) -> Self {
            self.followers.insert((memorial_id, user_id));
            self
        }

        /// Number of queries made against this store.
        pub fn query_count(&self) -> usize {
            self.query_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl GrantStore for MockGrantStore {
        async fn invitation(
            &self,
            memorial_id: MemorialId,
            email: &str,
        ) -> Result<Option<InvitationGrant>, GrantStoreError> {
            self.query_count.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .invitations
                .get(&(memorial_id, email.to_string()))
                .cloned())
        }

        async fn is_following(
            &self,
            memorial_id: MemorialId,
            user_id: UserId,
        ) -> Result<bool, GrantStoreError> {
            self.query_count.fetch_add(1, Ordering::SeqCst);
            Ok(self.followers.contains(&(memorial_id, user_id)))
        }
    }
}
