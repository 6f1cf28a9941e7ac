//! Event data model for the visit history log.
//!
//! Three shapes describe one edit as it moves through the pipeline:
//!
//! - [`CandidateEvent`]: produced by the change detector, no identity yet
//! - [`NewEvent`]: a candidate plus the editor, ready to append
//! - [`HistoryEvent`]: the stored, immutable record with a store-assigned
//!   id and timestamp
//!
//! The stored JSON shape is
//! `{id, type, beforeValue, afterValue, userId, userName, timestamp, metadata?}`.

pub mod types;

pub use types::{EventType, UnknownEventType};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::EditorIdentity;

/// Optional per-event metadata. Only note-level events carry a note id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<String>,
}

impl EventMetadata {
    #[must_use]
    pub fn for_note(note_id: impl Into<String>) -> Self {
        Self {
            note_id: Some(note_id.into()),
        }
    }
}

/// A detected edit that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEvent {
    pub event_type: EventType,
    pub before_value: String,
    pub after_value: String,
    pub metadata: Option<EventMetadata>,
}

impl CandidateEvent {
    /// Attach the editor identity, producing an appendable event.
    #[must_use]
    pub fn with_editor(self, editor: &EditorIdentity) -> NewEvent {
        NewEvent {
            event_type: self.event_type,
            before_value: self.before_value,
            after_value: self.after_value,
            user_id: editor.user_id.clone(),
            user_name: editor.user_name.clone(),
            metadata: self.metadata,
        }
    }
}

/// An event ready to append. The store assigns `id` and `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub event_type: EventType,
    pub before_value: String,
    pub after_value: String,
    pub user_id: String,
    pub user_name: String,
    pub metadata: Option<EventMetadata>,
}

/// One immutable entry in an entity's history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEvent {
    /// Opaque id assigned by the store (`ev-<hex>`).
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Plain-text value before the edit; empty for note adds.
    pub before_value: String,

    /// Plain-text value after the edit; empty for note deletes.
    pub after_value: String,

    pub user_id: String,
    pub user_name: String,

    /// Store-assigned creation time in microseconds since the Unix epoch.
    ///
    /// The only ordering key for events.
    pub timestamp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
}

impl HistoryEvent {
    /// Materialize a stored event from an appended one.
    #[must_use]
    pub fn from_new(id: String, timestamp: i64, event: NewEvent) -> Self {
        Self {
            id,
            event_type: event.event_type,
            before_value: event.before_value,
            after_value: event.after_value,
            user_id: event.user_id,
            user_name: event.user_name,
            timestamp,
            metadata: event.metadata,
        }
    }

    /// The note this event concerns, if it is a note-level event.
    #[must_use]
    pub fn note_id(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.note_id.as_deref())
    }

    /// The timestamp as a UTC datetime, if it is in range.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.timestamp)
    }

    /// Ordering key: timestamp first, id as a deterministic tie-breaker.
    #[must_use]
    pub fn sort_key(&self) -> (i64, &str) {
        (self.timestamp, self.id.as_str())
    }

    /// One-line preview of the change for terminal listings.
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        let text = match self.event_type {
            EventType::NoteDelete => &self.before_value,
            _ => &self.after_value,
        };
        let flat = text.replace('\n', " ");
        if flat.chars().count() > max_chars {
            let cut: String = flat.chars().take(max_chars).collect();
            format!("{cut}...")
        } else {
            flat
        }
    }
}

impl std::fmt::Display for HistoryEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.timestamp,
            self.id,
            self.event_type,
            self.user_name,
            self.preview(40)
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
