//! Schedule-to-stream reconciliation.
//!
//! Derives the desired stream set from a memorial's service schedule,
//! diffs it against the persisted schedule-managed resources, and issues
//! create/update/delete operations. Matching is by `(kind, index)` key,
//! never by title; change detection is by content hash. Manually created
//! resources are never touched.
//!
//! The batch is best-effort: operations on different resources run
//! concurrently and a failure on one item is recorded in the report
//! without aborting its siblings. Schedules are edited far more often
//! than they are fully valid; one bad entry must not block the rest.

use crate::actors::supervisor::BroadcastSupervisor;
use crate::errors::BroadcastError;
use crate::models::{desired_streams, DesiredStream, ServiceKey};

use access_control::models::{Action, Principal};
use common::types::{MemorialId, StreamId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

/// One failed reconciliation item.
#[derive(Debug)]
pub struct ReconcileItemError {
    /// Matching key of the affected entry, when known.
    pub key: Option<ServiceKey>,
    /// Affected persisted resource, when one exists.
    pub stream_id: Option<StreamId>,
    pub message: String,
}

/// Outcome of one reconciliation run.
///
/// Partial failure is the normal shape here: `errors` coexists with the
/// successful item lists and is never escalated to abort the batch.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub created: Vec<StreamId>,
    pub updated: Vec<StreamId>,
    pub deleted: Vec<StreamId>,
    pub errors: Vec<ReconcileItemError>,
}

impl ReconcileReport {
    /// Whether the run changed nothing and hit no errors.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
            && self.updated.is_empty()
            && self.deleted.is_empty()
            && self.errors.is_empty()
    }
}

enum Op {
    Create(DesiredStream),
    Update(StreamId, DesiredStream),
    Delete(StreamId, Option<ServiceKey>),
}

enum Outcome {
    Created(StreamId),
    Updated(StreamId),
    Deleted(StreamId),
    Failed(ReconcileItemError),
}

/// Reconcile on behalf of a principal. Requires edit access to the
/// memorial; the schedule itself was edited under the same gate.
pub async fn reconcile_for(
    principal: &Principal,
    supervisor: &Arc<BroadcastSupervisor>,
    memorial_id: MemorialId,
) -> Result<ReconcileReport, BroadcastError> {
    supervisor
        .authorize_memorial(principal, memorial_id, Action::EditContent)
        .await?;
    reconcile(supervisor, memorial_id).await
}

/// Reconcile a memorial's streams against its service schedule.
///
/// The schedule is read from the memorial document; the diff runs
/// against the persisted schedule-managed resources. Returns `Err` only
/// when the inputs cannot be loaded at all; per-item failures land in
/// the report.
#[instrument(skip_all, name = "broadcast.reconcile", fields(memorial_id = %memorial_id))]
pub async fn reconcile(
    supervisor: &Arc<BroadcastSupervisor>,
    memorial_id: MemorialId,
) -> Result<ReconcileReport, BroadcastError> {
    let store = supervisor.store();
    let memorial = store
        .get_memorial(memorial_id)
        .await?
        .ok_or_else(|| BroadcastError::NotFound(format!("memorial {memorial_id}")))?;

    let desired = desired_streams(&memorial.schedule);
    let existing = store.streams_by_memorial(memorial_id).await?;

    // Index managed resources by key. A duplicate key means an earlier
    // run was interrupted; the extra resource is treated as orphaned.
    let mut managed: HashMap<ServiceKey, StreamId> = HashMap::new();
    let mut orphans: Vec<(StreamId, Option<ServiceKey>)> = Vec::new();
    let mut hashes: HashMap<StreamId, Option<String>> = HashMap::new();
    for resource in existing {
        let Some(key) = resource.service_key else {
            // Manual resource: not ours.
            continue;
        };
        if managed.contains_key(&key) {
            orphans.push((resource.id, Some(key)));
        } else {
            hashes.insert(resource.id, resource.service_hash.clone());
            managed.insert(key, resource.id);
        }
    }

    let mut ops = Vec::new();
    for entry in desired {
        match managed.remove(&entry.key) {
            Some(stream_id) => {
                let unchanged = hashes
                    .get(&stream_id)
                    .is_some_and(|hash| hash.as_deref() == Some(entry.content_hash.as_str()));
                if !unchanged {
                    ops.push(Op::Update(stream_id, entry));
                }
            }
            None => ops.push(Op::Create(entry)),
        }
    }
    // Whatever keys remain have no desired counterpart.
    for (key, stream_id) in managed {
        orphans.push((stream_id, Some(key)));
    }
    for (stream_id, key) in orphans {
        ops.push(Op::Delete(stream_id, key));
    }

    // Operations target distinct resources, so they are independent and
    // run concurrently. Per-resource ordering is the actor's problem.
    let mut tasks = JoinSet::new();
    for op in ops {
        let supervisor = supervisor.clone();
        tasks.spawn(async move { apply(&supervisor, memorial_id, op).await });
    }

    let mut report = ReconcileReport::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Outcome::Created(id)) => report.created.push(id),
            Ok(Outcome::Updated(id)) => report.updated.push(id),
            Ok(Outcome::Deleted(id)) => report.deleted.push(id),
            Ok(Outcome::Failed(err)) => {
                warn!(
                    target: "broadcast.reconcile",
                    stream_id = ?err.stream_id,
                    message = %err.message,
                    "Reconcile item failed"
                );
                report.errors.push(err);
            }
            Err(e) => report.errors.push(ReconcileItemError {
                key: None,
                stream_id: None,
                message: format!("reconcile task panicked: {e}"),
            }),
        }
    }

    info!(
        target: "broadcast.reconcile",
        created = report.created.len(),
        updated = report.updated.len(),
        deleted = report.deleted.len(),
        errors = report.errors.len(),
        "Reconcile run finished"
    );
    Ok(report)
}

async fn apply(supervisor: &BroadcastSupervisor, memorial_id: MemorialId, op: Op) -> Outcome {
    match op {
        Op::Create(desired) => {
            let key = desired.key;
            match supervisor.create_managed(memorial_id, &desired).await {
                Ok(id) => Outcome::Created(id),
                Err(e) => Outcome::Failed(ReconcileItemError {
                    key: Some(key),
                    stream_id: None,
                    message: e.to_string(),
                }),
            }
        }
        Op::Update(stream_id, desired) => {
            let key = desired.key;
            match supervisor.apply_update(stream_id, desired).await {
                Ok(()) => Outcome::Updated(stream_id),
                Err(e) => Outcome::Failed(ReconcileItemError {
                    key: Some(key),
                    stream_id: Some(stream_id),
                    message: e.to_string(),
                }),
            }
        }
        Op::Delete(stream_id, key) => match supervisor.delete_managed(stream_id).await {
            Ok(()) => Outcome::Deleted(stream_id),
            Err(e) => Outcome::Failed(ReconcileItemError {
                key,
                stream_id: Some(stream_id),
                message: e.to_string(),
            }),
        },
    }
}
