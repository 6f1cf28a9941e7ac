//! Read and erase paths over an entity's history.
//!
//! [`list_history`] assembles the user-facing view: compacted snapshots plus
//! the live "Recent Edits" tail. [`expand_snapshot`] resolves one snapshot
//! to its events. A snapshot that references an event missing from the log
//! is a rendering gap, not an error: the reference is skipped and counted.
//!
//! [`erase_history`] is the administrative reset. It deletes events, then
//! snapshots, each phase in its own store transaction, and always reports
//! what it actually deleted.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::compact::{Snapshot, sort_ascending, uncompacted_events};
use crate::error::ErrorCode;
use crate::event::HistoryEvent;
use crate::store::{HistoryStore, StoreError};

// ---------------------------------------------------------------------------
// Read path
// ---------------------------------------------------------------------------

/// Everything a display surface needs to render an entity's history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryView {
    /// Uncompacted events, newest first.
    pub recent_events: Vec<HistoryEvent>,
    /// All snapshots, highest version first.
    pub snapshots: Vec<Snapshot>,
    /// Snapshot event references that could not be resolved.
    #[serde(skip_serializing_if = "is_zero")]
    pub missing_references: usize,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl HistoryView {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recent_events.is_empty() && self.snapshots.is_empty()
    }
}

/// History lookup errors.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("snapshot {snapshot_id} not found for {entity_id}")]
    SnapshotNotFound {
        entity_id: String,
        snapshot_id: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HistoryError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::SnapshotNotFound { .. } => ErrorCode::SnapshotNotFound,
            Self::Store(source) => source.code(),
        }
    }
}

/// Build the history view for one entity.
///
/// # Errors
///
/// Returns the store error if events or snapshots cannot be read.
pub fn list_history<S>(store: &S, entity_id: &str) -> Result<HistoryView, StoreError>
where
    S: HistoryStore + ?Sized,
{
    let events = store.list_events(entity_id)?;
    let mut snapshots = store.list_snapshots(entity_id)?;

    let missing_references = {
        let known: std::collections::HashSet<&str> =
            events.iter().map(|e| e.id.as_str()).collect();
        snapshots
            .iter()
            .flat_map(|s| s.event_ids.iter())
            .filter(|id| !known.contains(id.as_str()))
            .count()
    };
    if missing_references > 0 {
        warn!(
            entity_id = %entity_id,
            missing_references,
            "snapshots reference events missing from the log"
        );
    }

    let mut recent_events = uncompacted_events(events, &snapshots);
    recent_events.reverse();
    snapshots.sort_by(|a, b| b.version.cmp(&a.version).then_with(|| a.id.cmp(&b.id)));

    Ok(HistoryView {
        recent_events,
        snapshots,
        missing_references,
    })
}

/// Resolve a snapshot's event ids to events, in the snapshot's own order.
///
/// Ids that no longer resolve are skipped with a warning.
///
/// # Errors
///
/// Returns [`HistoryError::SnapshotNotFound`] for an unknown snapshot id, or
/// the store error if reads fail.
pub fn expand_snapshot<S>(
    store: &S,
    entity_id: &str,
    snapshot_id: &str,
) -> Result<Vec<HistoryEvent>, HistoryError>
where
    S: HistoryStore + ?Sized,
{
    let snapshot = store
        .list_snapshots(entity_id)?
        .into_iter()
        .find(|s| s.id == snapshot_id)
        .ok_or_else(|| HistoryError::SnapshotNotFound {
            entity_id: entity_id.to_string(),
            snapshot_id: snapshot_id.to_string(),
        })?;

    Ok(resolve_events(entity_id, &snapshot, store.list_events(entity_id)?))
}

/// Look up `snapshot.event_ids` in `events`, skipping dangling ids.
#[must_use]
pub fn resolve_events(
    entity_id: &str,
    snapshot: &Snapshot,
    events: Vec<HistoryEvent>,
) -> Vec<HistoryEvent> {
    let mut by_id: HashMap<String, HistoryEvent> =
        events.into_iter().map(|e| (e.id.clone(), e)).collect();

    let mut resolved = Vec::with_capacity(snapshot.event_ids.len());
    for id in &snapshot.event_ids {
        match by_id.remove(id) {
            Some(event) => resolved.push(event),
            None => warn!(
                entity_id = %entity_id,
                snapshot_id = %snapshot.id,
                event_id = %id,
                "skipping snapshot reference to missing event"
            ),
        }
    }
    resolved
}

/// All events of an entity, oldest first. Convenience for exports and tools.
///
/// # Errors
///
/// Returns the store error if events cannot be read.
pub fn full_log<S>(store: &S, entity_id: &str) -> Result<Vec<HistoryEvent>, StoreError>
where
    S: HistoryStore + ?Sized,
{
    let mut events = store.list_events(entity_id)?;
    sort_ascending(&mut events);
    Ok(events)
}

// ---------------------------------------------------------------------------
// Erase path
// ---------------------------------------------------------------------------

/// Counts removed by [`erase_history`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EraseReport {
    pub events_deleted: usize,
    pub snapshots_deleted: usize,
}

/// Which deletion phase failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErasePhase {
    Events,
    Snapshots,
}

impl std::fmt::Display for ErasePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Events => "events",
            Self::Snapshots => "snapshots",
        })
    }
}

/// Erasure failed part-way. `partial` holds what was deleted before it.
#[derive(Debug, thiserror::Error)]
#[error(
    "erasing {phase} for {entity_id} failed after deleting {} event(s) and {} snapshot(s): {source}",
    partial.events_deleted,
    partial.snapshots_deleted
)]
pub struct EraseError {
    pub entity_id: String,
    pub phase: ErasePhase,
    pub partial: EraseReport,
    #[source]
    pub source: StoreError,
}

impl EraseError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.source.code()
    }
}

/// Delete every event and snapshot of an entity.
///
/// # Errors
///
/// Returns [`EraseError`] if either phase fails. It is never reported as
/// success, and carries the counts deleted so far.
pub fn erase_history<S>(store: &S, entity_id: &str) -> Result<EraseReport, EraseError>
where
    S: HistoryStore + ?Sized,
{
    let mut report = EraseReport::default();

    report.events_deleted = store
        .delete_events(entity_id)
        .map_err(|source| EraseError {
            entity_id: entity_id.to_string(),
            phase: ErasePhase::Events,
            partial: report,
            source,
        })?;

    report.snapshots_deleted = store
        .delete_snapshots(entity_id)
        .map_err(|source| EraseError {
            entity_id: entity_id.to_string(),
            phase: ErasePhase::Snapshots,
            partial: report,
            source,
        })?;

    info!(
        entity_id = %entity_id,
        events_deleted = report.events_deleted,
        snapshots_deleted = report.snapshots_deleted,
        "erased history"
    );
    Ok(report)
}
