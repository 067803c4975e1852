//! Bridge session types.

use serde::{Deserialize, Serialize};

/// Connectivity status of a bridge session.
///
/// `Connecting` is entered only after the remote description is set;
/// before that the session is still `Negotiating` and has nothing to
/// report to peers. `Disconnected` is reached only through an explicit
/// stop — a dropped connection is `Failed`, never silently disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStatus {
    /// Bridge reserved, SDP exchange in flight.
    Negotiating,
    /// Remote description set; ICE/DTLS establishing.
    Connecting,
    /// Media is flowing.
    Connected,
    /// Connection failed or negotiation failed after reservation.
    Failed,
    /// Explicitly stopped.
    Disconnected,
}

impl BridgeStatus {
    /// Whether the session still holds remote infrastructure.
    #[must_use]
    pub fn holds_bridge(self) -> bool {
        !matches!(self, BridgeStatus::Disconnected)
    }
}

/// A reserved bridge, as returned by the bridge-start call.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeGrant {
    /// Bridge id for the later stop call.
    pub bridge_id: String,
    /// Endpoint the SDP offer is posted to.
    pub endpoint: String,
}

/// Snapshot of one session, as reported to callers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub bridge_id: String,
    pub status: BridgeStatus,
}
