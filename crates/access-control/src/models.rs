//! Types consumed and produced by the access resolver.
//!
//! `Principal` is constructed once per request from an already-verified
//! identity; the core never issues or validates tokens. `AccessSnapshot`
//! captures everything the resolver is allowed to look at, so decisions are
//! reproducible with no hidden state.

use common::types::{MemorialId, UserId};
use serde::{Deserialize, Serialize};

/// Role of the acting principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Owner,
    FuneralDirector,
    FamilyMember,
    Viewer,
}

/// The acting principal, immutable for the lifetime of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub email: String,
    pub role: Role,
    pub is_admin: bool,
}

impl Principal {
    /// Whether this principal carries site-wide admin privileges.
    #[must_use]
    pub fn has_admin_privileges(&self) -> bool {
        self.is_admin || self.role == Role::Admin
    }
}

/// Access level granted by the resolver, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    None,
    View,
    Edit,
    Admin,
}

/// Action the caller wants to perform against a memorial's resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Render the memorial or watch a visible broadcast.
    View,
    /// Mutate memorial content (photos, stream metadata).
    EditContent,
    /// Start or stop a live broadcast.
    ControlBroadcast,
}

/// Status of an invitation to join a memorial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
}

/// An invitation grant for one `(memorial, email)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationGrant {
    pub status: InvitationStatus,
    pub role_to_assign: Role,
}

/// Immutable snapshot of every grant source the resolver may consult.
///
/// Assembled once at the boundary (see [`crate::store::SnapshotLoader`]);
/// the resolver itself never performs I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessSnapshot {
    pub memorial_id: MemorialId,
    /// Owning user of the memorial.
    pub owner_id: UserId,
    /// Funeral director assigned to the memorial, if any.
    pub assigned_director_id: Option<UserId>,
    /// Public visibility flag; `None` (unset) is treated as public.
    pub is_public: Option<bool>,
    /// Invitation for the acting principal's email, if one exists.
    pub invitation: Option<InvitationGrant>,
    /// Whether the acting principal follows the memorial.
    pub is_follower: bool,
}

/// Outcome of permission resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub granted: bool,
    pub level: AccessLevel,
    pub reason: &'static str,
}

impl AccessDecision {
    pub(crate) fn denied(reason: &'static str) -> Self {
        Self {
            granted: false,
            level: AccessLevel::None,
            reason,
        }
    }
}
