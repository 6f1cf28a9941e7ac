//! Fixed-size snapshot compaction for the visit history log.
//!
//! Over time an entity's event log grows. Compaction groups the events that
//! are not yet part of any snapshot into consecutive batches of exactly
//! `batch_size` and persists each batch as an immutable, versioned
//! [`Snapshot`]. A short final batch is never persisted: it stays the live
//! "Recent Edits" tail until enough edits arrive to fill it.
//!
//! # Ground truth, not cursors
//!
//! Every run recomputes the uncompacted set from the stored events and
//! snapshots. A run that fails part-way leaves no in-memory state behind;
//! the next run (triggered by the next edit) simply picks up from whatever
//! the store holds.
//!
//! # Versioning
//!
//! Versions start at 1 and increase by one per snapshot. The current maximum
//! is re-read for every batch, and the write itself is conditional on that
//! maximum (see [`HistoryStore::insert_snapshot`]), so two concurrent runs
//! cannot both claim the same version.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::ErrorCode;
use crate::event::{EventType, HistoryEvent};
use crate::store::{HistoryStore, StoreError};

/// Canonical snapshot size.
pub const DEFAULT_BATCH_SIZE: usize = 10;

// ---------------------------------------------------------------------------
// Snapshot records
// ---------------------------------------------------------------------------

/// An immutable, versioned batch of consecutive events.
///
/// Stored shape: `{id, version, title, eventIds[], createdAt, eventCount, summary}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Opaque id assigned by the store (`snap-<hex>`).
    pub id: String,
    /// Per-entity version, starting at 1.
    pub version: u32,
    /// Always `"Version {version}"`.
    pub title: String,
    /// Member event ids in ascending timestamp order.
    pub event_ids: Vec<String>,
    /// Creation time in microseconds since the Unix epoch.
    pub created_at: i64,
    /// Equals `event_ids.len()`.
    pub event_count: usize,
    /// Counts-by-type summary, e.g. `"2 agenda edits, 1 note added"`.
    pub summary: String,
}

/// A snapshot about to be written. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSnapshot {
    pub version: u32,
    pub title: String,
    pub event_ids: Vec<String>,
    pub summary: String,
}

impl NewSnapshot {
    /// Build the snapshot for one full batch at `version`.
    #[must_use]
    pub fn for_batch(version: u32, batch: &[HistoryEvent]) -> Self {
        Self {
            version,
            title: format!("Version {version}"),
            event_ids: batch.iter().map(|e| e.id.clone()).collect(),
            summary: summarize(batch),
        }
    }
}

impl Snapshot {
    /// Materialize a stored snapshot from a validated [`NewSnapshot`].
    #[must_use]
    pub fn from_new(id: String, created_at: i64, snapshot: NewSnapshot) -> Self {
        Self {
            id,
            version: snapshot.version,
            title: snapshot.title,
            event_count: snapshot.event_ids.len(),
            event_ids: snapshot.event_ids,
            created_at,
            summary: snapshot.summary,
        }
    }
}

// ---------------------------------------------------------------------------
// CompactionReport / CompactError
// ---------------------------------------------------------------------------

/// Outcome of one compaction run for one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionReport {
    pub entity_id: String,
    /// Snapshots persisted by this run, in version order.
    pub snapshots_created: Vec<Snapshot>,
    /// Events moved out of the tail by this run.
    pub events_compacted: usize,
    /// Uncompacted events left after this run.
    pub tail_len: usize,
}

/// Compaction errors.
#[derive(Debug, thiserror::Error)]
pub enum CompactError {
    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("failed to load history for {entity_id}: {source}")]
    Load {
        entity_id: String,
        #[source]
        source: StoreError,
    },

    #[error(
        "failed to persist snapshot version {version} for {entity_id} after {created} new snapshot(s): {source}"
    )]
    Persist {
        entity_id: String,
        version: u32,
        created: usize,
        #[source]
        source: StoreError,
    },
}

impl CompactError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidBatchSize => ErrorCode::InvalidBatchSize,
            Self::Load { source, .. } | Self::Persist { source, .. } => source.code(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pure planning helpers
// ---------------------------------------------------------------------------

/// Full batches ready to persist plus the leftover tail, both ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPlan {
    pub batches: Vec<Vec<HistoryEvent>>,
    pub tail: Vec<HistoryEvent>,
}

/// Union of every event id referenced by `snapshots`.
#[must_use]
pub fn compacted_ids(snapshots: &[Snapshot]) -> HashSet<&str> {
    snapshots
        .iter()
        .flat_map(|s| s.event_ids.iter().map(String::as_str))
        .collect()
}

/// Events not referenced by any snapshot, sorted ascending by timestamp.
#[must_use]
pub fn uncompacted_events(events: Vec<HistoryEvent>, snapshots: &[Snapshot]) -> Vec<HistoryEvent> {
    let compacted = compacted_ids(snapshots);
    let mut tail: Vec<HistoryEvent> = events
        .into_iter()
        .filter(|e| !compacted.contains(e.id.as_str()))
        .collect();
    sort_ascending(&mut tail);
    tail
}

/// Sort events by `(timestamp, id)`.
pub fn sort_ascending(events: &mut [HistoryEvent]) {
    events.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

/// Split the uncompacted events into full batches and a short tail.
///
/// Chunking stops at the first chunk shorter than `batch_size`; partial
/// snapshots are never planned. `batch_size` must be non-zero.
#[must_use]
pub fn plan_batches(
    events: Vec<HistoryEvent>,
    snapshots: &[Snapshot],
    batch_size: usize,
) -> BatchPlan {
    debug_assert!(batch_size > 0, "batch_size must be non-zero");
    let batch_size = batch_size.max(1);
    let uncompacted = uncompacted_events(events, snapshots);
    let full_batches = uncompacted.len() / batch_size;

    let mut iter = uncompacted.into_iter();
    let mut batches = Vec::with_capacity(full_batches);
    for _ in 0..full_batches {
        batches.push(iter.by_ref().take(batch_size).collect());
    }

    BatchPlan {
        batches,
        tail: iter.collect(),
    }
}

/// Render a counts-by-type summary such as `"2 agenda edits, 1 note added"`.
#[must_use]
pub fn summarize(events: &[HistoryEvent]) -> String {
    let mut counts: BTreeMap<EventType, usize> = BTreeMap::new();
    for event in events {
        *counts.entry(event.event_type).or_default() += 1;
    }

    if counts.is_empty() {
        return "No changes".to_string();
    }

    EventType::ALL
        .iter()
        .filter_map(|et| {
            counts
                .get(et)
                .map(|&n| format!("{n} {}", et.summary_label(n)))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Compaction run
// ---------------------------------------------------------------------------

/// Create as many snapshots as the entity's uncompacted tail allows.
///
/// Batches are persisted in order. The first failure aborts the rest of the
/// run and is returned; snapshots created before it remain valid.
///
/// # Errors
///
/// - [`CompactError::InvalidBatchSize`] when `batch_size` is 0
/// - [`CompactError::Load`] when events or snapshots cannot be read
/// - [`CompactError::Persist`] when a version read or snapshot write fails,
///   including a lost race against a concurrent run
pub fn compact_entity<S>(
    store: &S,
    entity_id: &str,
    batch_size: usize,
) -> Result<CompactionReport, CompactError>
where
    S: HistoryStore + ?Sized,
{
    if batch_size == 0 {
        return Err(CompactError::InvalidBatchSize);
    }

    let load_err = |source| CompactError::Load {
        entity_id: entity_id.to_string(),
        source,
    };
    let events = store.list_events(entity_id).map_err(load_err)?;
    let snapshots = store.list_snapshots(entity_id).map_err(load_err)?;

    let plan = plan_batches(events, &snapshots, batch_size);
    let mut report = CompactionReport {
        entity_id: entity_id.to_string(),
        tail_len: plan.tail.len(),
        ..CompactionReport::default()
    };

    if plan.batches.is_empty() {
        debug!(
            entity_id = %entity_id,
            tail_len = report.tail_len,
            batch_size,
            "nothing to compact"
        );
        return Ok(report);
    }

    for batch in &plan.batches {
        let created = report.snapshots_created.len();
        let persist_err = |version, source| CompactError::Persist {
            entity_id: entity_id.to_string(),
            version,
            created,
            source,
        };

        // Re-read per batch: the previous iteration moved the maximum.
        let current = store
            .max_version(entity_id)
            .map_err(|source| persist_err(0, source))?;
        let version = current.saturating_add(1);

        match store.insert_snapshot(entity_id, NewSnapshot::for_batch(version, batch)) {
            Ok(snapshot) => {
                info!(
                    entity_id = %entity_id,
                    version = snapshot.version,
                    snapshot_id = %snapshot.id,
                    summary = %snapshot.summary,
                    "created history snapshot"
                );
                report.events_compacted += snapshot.event_count;
                report.snapshots_created.push(snapshot);
            }
            Err(source) => {
                if source.is_conflict() {
                    warn!(
                        entity_id = %entity_id,
                        version,
                        error = %source,
                        "lost snapshot race; leaving batch for the next run"
                    );
                } else {
                    error!(
                        entity_id = %entity_id,
                        version,
                        error = %source,
                        "snapshot write failed; abandoning remaining batches"
                    );
                }
                return Err(persist_err(version, source));
            }
        }
    }

    Ok(report)
}
