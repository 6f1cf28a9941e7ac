//! Event type enum covering the five history event kinds.
//!
//! The string representation is the snake_case name persisted in the
//! `type` field of every stored event.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The five edit kinds recorded in a visit's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    /// The agenda text changed.
    AgendaEdit,
    /// The debrief text changed.
    DebriefEdit,
    /// A note was added.
    NoteAdd,
    /// An existing note's text changed.
    NoteEdit,
    /// A note was removed.
    NoteDelete,
}

/// Error returned when parsing an unknown event type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventType {
    /// The unrecognised input string.
    pub raw: String,
}

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown event type '{}': expected one of agenda_edit, debrief_edit, \
             note_add, note_edit, note_delete",
            self.raw
        )
    }
}

impl std::error::Error for UnknownEventType {}

impl EventType {
    /// All known event types in catalog order.
    pub const ALL: [Self; 5] = [
        Self::AgendaEdit,
        Self::DebriefEdit,
        Self::NoteAdd,
        Self::NoteEdit,
        Self::NoteDelete,
    ];

    /// Return the persisted snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AgendaEdit => "agenda_edit",
            Self::DebriefEdit => "debrief_edit",
            Self::NoteAdd => "note_add",
            Self::NoteEdit => "note_edit",
            Self::NoteDelete => "note_delete",
        }
    }

    /// Human label used in snapshot summaries, pluralised by `count`.
    #[must_use]
    pub const fn summary_label(self, count: usize) -> &'static str {
        let one = count == 1;
        match self {
            Self::AgendaEdit if one => "agenda edit",
            Self::AgendaEdit => "agenda edits",
            Self::DebriefEdit if one => "debrief edit",
            Self::DebriefEdit => "debrief edits",
            Self::NoteAdd if one => "note added",
            Self::NoteAdd => "notes added",
            Self::NoteEdit if one => "note edited",
            Self::NoteEdit => "notes edited",
            Self::NoteDelete if one => "note deleted",
            Self::NoteDelete => "notes deleted",
        }
    }

    /// True for the three note-level kinds, which carry a note id.
    #[must_use]
    pub const fn is_note_event(self) -> bool {
        matches!(self, Self::NoteAdd | Self::NoteEdit | Self::NoteDelete)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agenda_edit" => Ok(Self::AgendaEdit),
            "debrief_edit" => Ok(Self::DebriefEdit),
            "note_add" => Ok(Self::NoteAdd),
            "note_edit" => Ok(Self::NoteEdit),
            "note_delete" => Ok(Self::NoteDelete),
            _ => Err(UnknownEventType { raw: s.to_string() }),
        }
    }
}

// Custom serde: serialize as the snake_case string.
impl Serialize for EventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
