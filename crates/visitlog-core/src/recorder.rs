//! Capture pipeline: detect, append, then opportunistically compact.
//!
//! History is a side effect of saving a visit. Nothing in here is allowed to
//! fail the caller's save, so [`record_change`] returns a [`RecordOutcome`]
//! describing what happened instead of a `Result`. Failures are logged and
//! reported on the outcome.

use serde::Serialize;
use tracing::{debug, error, info};

use crate::compact::{CompactError, CompactionReport, compact_entity};
use crate::config::HistorySettings;
use crate::detect::detect_changes;
use crate::event::{CandidateEvent, HistoryEvent};
use crate::model::{EditorIdentity, VisitState};
use crate::store::{HistoryStore, StoreError};

/// An append failed. Events appended before it stay in the log.
#[derive(Debug, thiserror::Error)]
#[error("captured {} of {attempted} event(s) for {entity_id}: {source}", appended.len())]
pub struct CaptureError {
    pub entity_id: String,
    pub attempted: usize,
    pub appended: Vec<HistoryEvent>,
    #[source]
    pub source: StoreError,
}

/// What one save did to the history.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    /// Candidate events produced by the detector.
    pub detected: usize,
    /// Events that made it into the log, in append order.
    pub captured: Vec<HistoryEvent>,
    #[serde(skip)]
    pub capture_error: Option<StoreError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compaction: Option<CompactionReport>,
    #[serde(skip)]
    pub compaction_error: Option<CompactError>,
}

impl RecordOutcome {
    /// True when nothing failed.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.capture_error.is_none() && self.compaction_error.is_none()
    }

    /// Snapshots created by the compaction that followed capture.
    #[must_use]
    pub fn snapshots_created(&self) -> usize {
        self.compaction
            .as_ref()
            .map_or(0, |report| report.snapshots_created.len())
    }
}

/// Append `candidates` in order, stopping at the first failure.
///
/// # Errors
///
/// Returns [`CaptureError`] carrying the events appended before the failure.
pub fn record_events<S>(
    store: &S,
    entity_id: &str,
    candidates: Vec<CandidateEvent>,
    editor: &EditorIdentity,
) -> Result<Vec<HistoryEvent>, CaptureError>
where
    S: HistoryStore + ?Sized,
{
    let attempted = candidates.len();
    let mut appended = Vec::with_capacity(attempted);
    for candidate in candidates {
        match store.append_event(entity_id, candidate.with_editor(editor)) {
            Ok(event) => {
                debug!(
                    entity_id = %entity_id,
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "captured history event"
                );
                appended.push(event);
            }
            Err(source) => {
                return Err(CaptureError {
                    entity_id: entity_id.to_string(),
                    attempted,
                    appended,
                    source,
                });
            }
        }
    }
    Ok(appended)
}

/// Record the difference between two states of one visit.
///
/// Detects changes, appends each as an event attributed to `editor`, and
/// then compacts when `settings.compact_on_append` is set and at least one
/// event was appended. Failures never propagate; they are logged and left
/// on the returned outcome.
pub fn record_change<S>(
    store: &S,
    entity_id: &str,
    before: &VisitState,
    after: &VisitState,
    editor: &EditorIdentity,
    settings: &HistorySettings,
) -> RecordOutcome
where
    S: HistoryStore + ?Sized,
{
    let candidates = detect_changes(before, after);
    let mut outcome = RecordOutcome {
        detected: candidates.len(),
        ..RecordOutcome::default()
    };

    if candidates.is_empty() {
        debug!(entity_id = %entity_id, "no content changes detected");
        return outcome;
    }

    match record_events(store, entity_id, candidates, editor) {
        Ok(events) => outcome.captured = events,
        Err(err) => {
            error!(
                entity_id = %entity_id,
                captured = err.appended.len(),
                attempted = err.attempted,
                error = %err.source,
                "history capture failed"
            );
            outcome.captured = err.appended;
            outcome.capture_error = Some(err.source);
        }
    }

    if outcome.captured.is_empty() || !settings.compact_on_append {
        return outcome;
    }

    match compact_entity(store, entity_id, settings.batch_size) {
        Ok(report) => {
            if !report.snapshots_created.is_empty() {
                info!(
                    entity_id = %entity_id,
                    snapshots = report.snapshots_created.len(),
                    tail_len = report.tail_len,
                    "compacted history after capture"
                );
            }
            outcome.compaction = Some(report);
        }
        Err(err) => {
            error!(
                entity_id = %entity_id,
                code = %err.code(),
                error = %err,
                "history compaction failed; will retry on next capture"
            );
            outcome.compaction_error = Some(err);
        }
    }

    outcome
}
