//! Persistence seam for history events and snapshots.
//!
//! The host document store is an external collaborator; [`HistoryStore`]
//! models the handful of operations the history core needs from it. Reads
//! are unordered: callers sort on `timestamp` / `version` themselves.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryStore`]: in-process, with one-shot fault injection for tests
//! - [`SqliteStore`]: durable, `rusqlite`-backed
//!
//! # Snapshot writes
//!
//! [`HistoryStore::insert_snapshot`] is a conditional write. It succeeds only
//! when the entity's current maximum version is exactly
//! `snapshot.version - 1` and none of the snapshot's events already belong
//! to another snapshot. Concurrent compaction runs on one entity therefore
//! cannot produce duplicate versions or double-compacted events; the loser
//! gets [`StoreError::VersionConflict`] or
//! [`StoreError::EventsAlreadyCompacted`].

mod ids;
pub mod memory;
pub mod sqlite;

pub use ids::{IdGenerator, MonotonicClock};
pub use memory::{Fault, MemoryStore};
pub use sqlite::SqliteStore;

use crate::compact::{NewSnapshot, Snapshot};
use crate::error::ErrorCode;
use crate::event::{HistoryEvent, NewEvent};

/// Errors raised by a [`HistoryStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(
        "snapshot version conflict for {entity_id}: expected current max {expected}, found {actual}"
    )]
    VersionConflict {
        entity_id: String,
        expected: u32,
        actual: u32,
    },

    #[error("event {event_id} of {entity_id} already belongs to a snapshot")]
    EventsAlreadyCompacted { entity_id: String, event_id: String },

    #[error("snapshot for {entity_id} references unknown event {event_id}")]
    UnknownEvent { entity_id: String, event_id: String },

    #[error("invalid snapshot for {entity_id}: {reason}")]
    InvalidSnapshot { entity_id: String, reason: String },

    #[error("corrupt history record: {0}")]
    Corrupt(String),

    #[error("history store unavailable: {0}")]
    Unavailable(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::VersionConflict { .. } => ErrorCode::VersionConflict,
            Self::EventsAlreadyCompacted { .. } => ErrorCode::EventsAlreadyCompacted,
            Self::UnknownEvent { .. } => ErrorCode::UnknownEventReference,
            Self::InvalidSnapshot { .. } => ErrorCode::InvalidSnapshot,
            Self::Corrupt(_) | Self::Serialization(_) => ErrorCode::CorruptRecord,
            Self::Unavailable(_) => ErrorCode::StoreUnavailable,
            Self::Sqlite(_) => ErrorCode::StoreWriteFailed,
        }
    }

    /// True when the error means another writer got there first.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::VersionConflict { .. } | Self::EventsAlreadyCompacted { .. }
        )
    }
}

/// Storage operations needed by the history core.
///
/// Implementations must be safe to share across threads; every method is a
/// short, synchronous, self-contained store interaction.
pub trait HistoryStore: Send + Sync {
    /// Append one event, assigning a fresh id and a creation timestamp.
    ///
    /// Timestamps are strictly increasing per store so that events from a
    /// single write still have distinct ordering keys.
    fn append_event(&self, entity_id: &str, event: NewEvent) -> Result<HistoryEvent, StoreError>;

    /// All events of an entity, in no particular order.
    fn list_events(&self, entity_id: &str) -> Result<Vec<HistoryEvent>, StoreError>;

    /// All snapshots of an entity, in no particular order.
    fn list_snapshots(&self, entity_id: &str) -> Result<Vec<Snapshot>, StoreError>;

    /// Highest snapshot version for an entity, or 0 when it has none.
    fn max_version(&self, entity_id: &str) -> Result<u32, StoreError>;

    /// Conditionally persist a snapshot. See the module docs.
    fn insert_snapshot(
        &self,
        entity_id: &str,
        snapshot: NewSnapshot,
    ) -> Result<Snapshot, StoreError>;

    /// Delete every event of an entity in one transaction. Returns the count.
    fn delete_events(&self, entity_id: &str) -> Result<usize, StoreError>;

    /// Delete every snapshot of an entity in one transaction. Returns the count.
    fn delete_snapshots(&self, entity_id: &str) -> Result<usize, StoreError>;
}

/// Shared validation for [`HistoryStore::insert_snapshot`] implementations.
pub(crate) fn validate_new_snapshot(
    entity_id: &str,
    snapshot: &NewSnapshot,
) -> Result<(), StoreError> {
    let invalid = |reason: &str| StoreError::InvalidSnapshot {
        entity_id: entity_id.to_string(),
        reason: reason.to_string(),
    };

    if snapshot.version == 0 {
        return Err(invalid("version must be at least 1"));
    }
    if snapshot.event_ids.is_empty() {
        return Err(invalid("snapshot has no events"));
    }
    let mut seen = std::collections::HashSet::with_capacity(snapshot.event_ids.len());
    for id in &snapshot.event_ids {
        if !seen.insert(id.as_str()) {
            return Err(invalid(&format!("event {id} listed twice")));
        }
    }
    Ok(())
}
