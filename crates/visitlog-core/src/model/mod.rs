//! Entity state handed to the change detector by the host write path.

use serde::{Deserialize, Deserializer, Serialize};

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The editable fields of one visit record, as seen before or after a write.
///
/// Missing or `null` fields deserialize as empty, so partial documents from the host
/// store compare cleanly against full ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitState {
    #[serde(default, deserialize_with = "null_as_default")]
    pub agenda: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub debrief: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub notes: Vec<Note>,
}

impl VisitState {
    #[must_use]
    pub fn new(agenda: impl Into<String>, debrief: impl Into<String>) -> Self {
        Self {
            agenda: agenda.into(),
            debrief: debrief.into(),
            notes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_note(mut self, id: impl Into<String>, text: impl Into<String>) -> Self {
        self.notes.push(Note::new(id, text));
        self
    }
}

/// A free-form note attached to a visit, identified by a stable id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    #[serde(
        default,
        alias = "content",
        alias = "body",
        deserialize_with = "null_as_default"
    )]
    pub text: String,
}

impl Note {
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Who made an edit. Resolved once by the host at capture time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorIdentity {
    pub user_id: String,
    pub user_name: String,
}

impl EditorIdentity {
    #[must_use]
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
        }
    }
}
