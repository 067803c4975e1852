//! Canonical broadcast resource schema and schedule derivation.
//!
//! There is exactly one shape for a persisted broadcast resource:
//! [`BroadcastResource`]. Documents written by older versions of the
//! platform are migrated once, at the storage boundary, by
//! [`normalize_resource`] — business logic never sees legacy aliases.
//!
//! The desired-state derivation for reconciliation also lives here:
//! schedule entries map deterministically to [`DesiredStream`] descriptors
//! with stable titles and a content hash.

use crate::errors::BroadcastError;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use common::types::{MemorialId, StreamId, UserId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Lifecycle status of a broadcast resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    /// Created ahead of time; not yet startable.
    Scheduled,
    /// Startable: scheduled time reached or manually promoted.
    Ready,
    /// Start in flight: external infrastructure provisioning/negotiating.
    Connecting,
    /// Broadcasting.
    Live,
    /// Broadcast stopped; recording still processing on the platform.
    Ending,
    /// Terminal: recording ready, or recording given up on.
    Completed,
    /// Terminal: unrecoverable external failure.
    Error,
}

impl StreamStatus {
    /// Whether this status admits no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamStatus::Completed | StreamStatus::Error)
    }

    /// Legal forward transitions. `Error` is reachable from any
    /// non-terminal state and is handled separately.
    #[must_use]
    pub fn can_transition_to(self, next: StreamStatus) -> bool {
        if next == StreamStatus::Error {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (StreamStatus::Scheduled, StreamStatus::Ready)
                | (StreamStatus::Ready, StreamStatus::Connecting)
                | (StreamStatus::Connecting, StreamStatus::Live)
                | (StreamStatus::Live, StreamStatus::Ending)
                | (StreamStatus::Ending, StreamStatus::Completed)
        )
    }
}

/// Status of one recording interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingSessionStatus {
    Processing,
    Ready,
    Failed,
}

/// One distinct recording interval detected by the lifecycle machine.
///
/// Append-only: never mutated after reaching `Ready` or `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    pub session_id: String,
    pub external_media_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    pub status: RecordingSessionStatus,
    #[serde(default)]
    pub recording_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

/// Kind of a service schedule entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Main,
    Location,
    Day,
}

/// Reconciliation matching key: `(kind, index)`, never the title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceKey {
    pub kind: ServiceKind,
    #[serde(default)]
    pub index: Option<u32>,
}

/// One entry of a memorial's service schedule. Read-only input to
/// reconciliation, sourced from the memorial document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceScheduleEntry {
    pub kind: ServiceKind,
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub location_name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub time: Option<NaiveTime>,
    #[serde(default)]
    pub duration_hours: Option<f64>,
    #[serde(default)]
    pub disabled: bool,
}

/// The memorial document, as far as the core reads it.
///
/// The core never creates or deletes memorials; it reads ownership,
/// visibility, and the service schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorialDoc {
    pub id: MemorialId,
    pub owner_id: UserId,
    #[serde(default)]
    pub assigned_director_id: Option<UserId>,
    #[serde(default)]
    pub is_public: Option<bool>,
    #[serde(default)]
    pub schedule: Vec<ServiceScheduleEntry>,
}

impl MemorialDoc {
    /// The fields the access resolver needs.
    #[must_use]
    pub fn access_ref(&self) -> access_control::store::MemorialRef {
        access_control::store::MemorialRef {
            id: self.id,
            owner_id: self.owner_id,
            assigned_director_id: self.assigned_director_id,
            is_public: self.is_public,
        }
    }
}

/// The persisted record of one live/recorded stream attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastResource {
    pub id: StreamId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub memorial_id: Option<MemorialId>,
    /// Live input id on the external platform, once provisioned.
    #[serde(default)]
    pub external_media_id: Option<String>,
    #[serde(default)]
    pub stream_key: Option<String>,
    #[serde(default)]
    pub playback_url: Option<String>,
    pub status: StreamStatus,
    #[serde(default)]
    pub scheduled_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recording_ready: bool,
    #[serde(default)]
    pub recording_url: Option<String>,
    #[serde(default)]
    pub recording_sessions: Vec<RecordingSession>,
    #[serde(default = "default_true")]
    pub is_visible: bool,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default)]
    pub created_by: Option<UserId>,
    #[serde(default)]
    pub allowed_users: Option<Vec<UserId>>,
    /// Matching key for schedule-managed resources; absent for manual ones.
    #[serde(default)]
    pub service_key: Option<ServiceKey>,
    /// Hash of the schedule entry that produced this resource; absent for
    /// manual ones. Owned exclusively by the reconciliation engine.
    #[serde(default)]
    pub service_hash: Option<String>,
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl BroadcastResource {
    /// Whether this resource is managed by the reconciliation engine.
    #[must_use]
    pub fn is_schedule_managed(&self) -> bool {
        self.service_key.is_some()
    }
}

/// A desired broadcast resource derived from one schedule entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredStream {
    pub key: ServiceKey,
    pub title: String,
    pub description: Option<String>,
    pub location_name: String,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub duration_hours: Option<f64>,
    pub content_hash: String,
}

/// Derive the desired stream set from a schedule.
///
/// Disabled entries produce nothing. Every enabled entry produces exactly
/// one descriptor with a stable, non-empty title: a missing location name
/// auto-fills as `"Location {n}"` with `n` the 1-based position in the
/// schedule including the main slot. `scheduled_start` is set only when
/// both date and time are present; no times are invented. Entries that
/// collide on an explicit `(kind, index)` key collapse to the first one,
/// so a malformed schedule cannot make the desired set ambiguous.
#[must_use]
pub fn desired_streams(schedule: &[ServiceScheduleEntry]) -> Vec<DesiredStream> {
    let mut location_ordinal = 0u32;
    let mut day_ordinal = 0u32;
    let mut seen: HashSet<ServiceKey> = HashSet::new();
    let mut desired = Vec::new();

    for (position, entry) in schedule.iter().enumerate() {
        if entry.disabled {
            continue;
        }

        let location_name = if entry.location_name.trim().is_empty() {
            format!("Location {}", position + 1)
        } else {
            entry.location_name.trim().to_string()
        };

        let title = match entry.kind {
            ServiceKind::Main => format!("{location_name} Service"),
            ServiceKind::Location => format!("Additional Location - {location_name}"),
            ServiceKind::Day => format!("Additional Day - {location_name}"),
        };

        let key = ServiceKey {
            kind: entry.kind,
            index: match entry.kind {
                ServiceKind::Main => None,
                ServiceKind::Location => Some(entry.index.unwrap_or_else(|| {
                    location_ordinal += 1;
                    location_ordinal - 1
                })),
                ServiceKind::Day => Some(entry.index.unwrap_or_else(|| {
                    day_ordinal += 1;
                    day_ordinal - 1
                })),
            },
        };

        // First entry wins a contested key.
        if !seen.insert(key) {
            continue;
        }

        let scheduled_start = match (entry.date, entry.time) {
            (Some(date), Some(time)) => Some(date.and_time(time).and_utc()),
            _ => None,
        };

        desired.push(DesiredStream {
            key,
            title,
            description: entry
                .address
                .as_deref()
                .map(|addr| format!("{location_name}, {addr}")),
            location_name,
            scheduled_start,
            duration_hours: entry.duration_hours,
            content_hash: service_content_hash(entry),
        });
    }

    desired
}

/// Content hash over the reconciliation-relevant fields of an entry.
///
/// Covers location, scheduled date/time, and duration; cosmetic fields
/// (address text) do not force an update.
#[must_use]
pub fn service_content_hash(entry: &ServiceScheduleEntry) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entry.location_name.trim().as_bytes());
    hasher.update(b"|");
    if let Some(date) = entry.date {
        hasher.update(date.to_string().as_bytes());
    }
    hasher.update(b"|");
    if let Some(time) = entry.time {
        hasher.update(time.to_string().as_bytes());
    }
    hasher.update(b"|");
    if let Some(duration) = entry.duration_hours {
        hasher.update(duration.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Migrate a stored document to the canonical schema and deserialize it.
///
/// This is the single normalization step for loosely shaped legacy
/// documents: field aliases are renamed, legacy status strings mapped,
/// and absent collections defaulted. Everything downstream works with
/// [`BroadcastResource`] only.
pub fn normalize_resource(mut value: serde_json::Value) -> Result<BroadcastResource, BroadcastError> {
    let Some(doc) = value.as_object_mut() else {
        return Err(BroadcastError::Storage(
            "broadcast document is not an object".to_string(),
        ));
    };

    // Legacy field aliases.
    for (legacy, canonical) in [
        ("mediaId", "externalMediaId"),
        ("playback_url", "playbackUrl"),
        ("stream_key", "streamKey"),
        ("state", "status"),
    ] {
        if let Some(v) = doc.remove(legacy) {
            doc.entry(canonical).or_insert(v);
        }
    }

    // Legacy status spellings.
    if let Some(status) = doc.get_mut("status") {
        if let Some(lowered) = status.as_str().map(str::to_ascii_lowercase) {
            let mapped = match lowered.as_str() {
                "idle" | "pending" => "scheduled".to_string(),
                "finished" | "ended" => "completed".to_string(),
                "scheduled" | "ready" | "connecting" | "live" | "ending" | "completed"
                | "error" => lowered.clone(),
                unknown => {
                    return Err(BroadcastError::Storage(format!(
                        "unknown broadcast status: {unknown}"
                    )))
                }
            };
            *status = serde_json::Value::String(mapped);
        }
    }

    serde_json::from_value(value)
        .map_err(|e| BroadcastError::Storage(format!("malformed broadcast document: {e}")))
}
