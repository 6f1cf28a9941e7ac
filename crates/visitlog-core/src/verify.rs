//! Integrity checks over one entity's stored history.
//!
//! The store enforces the snapshot rules on write, but data can still be
//! damaged out of band (manual edits, partial erasure, an old binary). This
//! module re-derives every rule from what is stored and reports each
//! violation as a [`Finding`].

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::compact::{Snapshot, uncompacted_events};
use crate::store::{HistoryStore, StoreError};

/// One integrity violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    /// An event is a member of more than one snapshot.
    SharedEvent {
        event_id: String,
        snapshot_ids: Vec<String>,
    },
    /// Versions are not exactly `1..=n`.
    VersionGap { expected: u32, found: u32 },
    /// Two snapshots claim the same version.
    DuplicateVersion { version: u32, snapshot_ids: Vec<String> },
    /// `event_count` disagrees with `event_ids.len()`.
    CountMismatch {
        snapshot_id: String,
        event_count: usize,
        actual: usize,
    },
    /// A snapshot's size differs from the configured batch size.
    WrongBatchSize {
        snapshot_id: String,
        size: usize,
        batch_size: usize,
    },
    /// A snapshot references an event missing from the log.
    DanglingReference { snapshot_id: String, event_id: String },
    /// The uncompacted tail holds a full batch or more.
    TailTooLong { tail_len: usize, batch_size: usize },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedEvent {
                event_id,
                snapshot_ids,
            } => write!(
                f,
                "event {event_id} appears in snapshots {}",
                snapshot_ids.join(", ")
            ),
            Self::VersionGap { expected, found } => {
                write!(f, "expected version {expected}, found {found}")
            }
            Self::DuplicateVersion {
                version,
                snapshot_ids,
            } => write!(
                f,
                "version {version} is claimed by {}",
                snapshot_ids.join(", ")
            ),
            Self::CountMismatch {
                snapshot_id,
                event_count,
                actual,
            } => write!(
                f,
                "snapshot {snapshot_id} records {event_count} events but lists {actual}"
            ),
            Self::WrongBatchSize {
                snapshot_id,
                size,
                batch_size,
            } => write!(
                f,
                "snapshot {snapshot_id} holds {size} events, batch size is {batch_size}"
            ),
            Self::DanglingReference {
                snapshot_id,
                event_id,
            } => write!(f, "snapshot {snapshot_id} references missing event {event_id}"),
            Self::TailTooLong {
                tail_len,
                batch_size,
            } => write!(
                f,
                "{tail_len} uncompacted events, at least one full batch of {batch_size} pending"
            ),
        }
    }
}

/// Result of [`verify_entity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    pub entity_id: String,
    pub event_count: usize,
    pub snapshot_count: usize,
    pub tail_len: usize,
    pub findings: Vec<Finding>,
}

impl VerifyReport {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Check every stored snapshot rule for `entity_id`.
///
/// A long tail is reported but is not corruption: it means a compaction run
/// failed and the next capture has not retried yet.
///
/// # Errors
///
/// Returns the store error if events or snapshots cannot be read.
pub fn verify_entity<S>(
    store: &S,
    entity_id: &str,
    batch_size: usize,
) -> Result<VerifyReport, StoreError>
where
    S: HistoryStore + ?Sized,
{
    let events = store.list_events(entity_id)?;
    let mut snapshots = store.list_snapshots(entity_id)?;
    snapshots.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.id.cmp(&b.id)));

    let event_ids: HashSet<&str> = events.iter().map(|e| e.id.as_str()).collect();
    let mut findings = Vec::new();
    check_versions(&snapshots, &mut findings);
    check_members(&snapshots, &event_ids, batch_size, &mut findings);
    check_disjoint(&snapshots, &mut findings);

    let event_count = events.len();
    let tail_len = uncompacted_events(events, &snapshots).len();
    if batch_size > 0 && tail_len >= batch_size {
        findings.push(Finding::TailTooLong {
            tail_len,
            batch_size,
        });
    }

    if findings.is_empty() {
        debug!(entity_id = %entity_id, "history verified clean");
    } else {
        warn!(
            entity_id = %entity_id,
            findings = findings.len(),
            "history integrity findings"
        );
    }

    Ok(VerifyReport {
        entity_id: entity_id.to_string(),
        event_count,
        snapshot_count: snapshots.len(),
        tail_len,
        findings,
    })
}

fn check_versions(snapshots: &[Snapshot], findings: &mut Vec<Finding>) {
    let mut by_version: HashMap<u32, Vec<String>> = HashMap::new();
    for snapshot in snapshots {
        by_version
            .entry(snapshot.version)
            .or_default()
            .push(snapshot.id.clone());
    }

    let mut distinct: Vec<u32> = by_version.keys().copied().collect();
    distinct.sort_unstable();
    for version in &distinct {
        if let Some(ids) = by_version.get(version).filter(|ids| ids.len() > 1) {
            findings.push(Finding::DuplicateVersion {
                version: *version,
                snapshot_ids: ids.clone(),
            });
        }
    }

    for (expected, found) in (1_u32..).zip(distinct) {
        if expected != found {
            findings.push(Finding::VersionGap { expected, found });
            break;
        }
    }
}

fn check_members(
    snapshots: &[Snapshot],
    event_ids: &HashSet<&str>,
    batch_size: usize,
    findings: &mut Vec<Finding>,
) {
    for snapshot in snapshots {
        let actual = snapshot.event_ids.len();
        if snapshot.event_count != actual {
            findings.push(Finding::CountMismatch {
                snapshot_id: snapshot.id.clone(),
                event_count: snapshot.event_count,
                actual,
            });
        }
        if batch_size > 0 && actual != batch_size {
            findings.push(Finding::WrongBatchSize {
                snapshot_id: snapshot.id.clone(),
                size: actual,
                batch_size,
            });
        }
        for id in &snapshot.event_ids {
            if !event_ids.contains(id.as_str()) {
                findings.push(Finding::DanglingReference {
                    snapshot_id: snapshot.id.clone(),
                    event_id: id.clone(),
                });
            }
        }
    }
}

fn check_disjoint(snapshots: &[Snapshot], findings: &mut Vec<Finding>) {
    let mut owners: HashMap<&str, Vec<String>> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for snapshot in snapshots {
        for id in &snapshot.event_ids {
            let entry = owners.entry(id.as_str()).or_default();
            if entry.is_empty() {
                order.push(id.as_str());
            }
            entry.push(snapshot.id.clone());
        }
    }

    for id in order {
        if let Some(snapshot_ids) = owners.remove(id).filter(|ids| ids.len() > 1) {
            findings.push(Finding::SharedEvent {
                event_id: id.to_string(),
                snapshot_ids,
            });
        }
    }
}
