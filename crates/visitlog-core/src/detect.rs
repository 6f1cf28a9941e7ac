//! Content-based change detection between two states of a visit.
//!
//! [`detect_changes`] is pure: it compares the normalized plain text of each
//! editable field and emits one [`CandidateEvent`] per semantic change.
//! Formatting-only edits that normalize to the same text produce nothing,
//! which keeps history free of no-op entries.
//!
//! Output order is fixed: agenda, debrief, note adds and edits in `after`
//! order, then note deletes in `before` order.

use std::collections::HashMap;

use crate::event::{CandidateEvent, EventMetadata, EventType};
use crate::model::{Note, VisitState};
use crate::text::plain_text;

/// Compare `before` and `after` and return the edits between them.
#[must_use]
pub fn detect_changes(before: &VisitState, after: &VisitState) -> Vec<CandidateEvent> {
    let mut events = Vec::new();

    if let Some(event) = diff_field(EventType::AgendaEdit, &before.agenda, &after.agenda) {
        events.push(event);
    }
    if let Some(event) = diff_field(EventType::DebriefEdit, &before.debrief, &after.debrief) {
        events.push(event);
    }

    diff_notes(&before.notes, &after.notes, &mut events);
    events
}

fn diff_field(event_type: EventType, before: &str, after: &str) -> Option<CandidateEvent> {
    let before = plain_text(before);
    let after = plain_text(after);
    (before != after).then(|| CandidateEvent {
        event_type,
        before_value: before,
        after_value: after,
        metadata: None,
    })
}

/// Index notes by id, keeping first-seen order. A repeated id keeps its
/// last text.
fn index_notes(notes: &[Note]) -> (Vec<&str>, HashMap<&str, &str>) {
    let mut order = Vec::with_capacity(notes.len());
    let mut by_id = HashMap::with_capacity(notes.len());
    for note in notes {
        if by_id.insert(note.id.as_str(), note.text.as_str()).is_none() {
            order.push(note.id.as_str());
        }
    }
    (order, by_id)
}

fn diff_notes(before: &[Note], after: &[Note], events: &mut Vec<CandidateEvent>) {
    let (before_order, before_by_id) = index_notes(before);
    let (after_order, after_by_id) = index_notes(after);

    for id in &after_order {
        let after_text = plain_text(after_by_id[id]);
        match before_by_id.get(id) {
            None => events.push(note_event(EventType::NoteAdd, id, String::new(), after_text)),
            Some(before_raw) => {
                let before_text = plain_text(before_raw);
                if before_text != after_text {
                    events.push(note_event(EventType::NoteEdit, id, before_text, after_text));
                }
            }
        }
    }

    for id in &before_order {
        if !after_by_id.contains_key(id) {
            let before_text = plain_text(before_by_id[id]);
            events.push(note_event(EventType::NoteDelete, id, before_text, String::new()));
        }
    }
}

fn note_event(
    event_type: EventType,
    note_id: &str,
    before_value: String,
    after_value: String,
) -> CandidateEvent {
    CandidateEvent {
        event_type,
        before_value,
        after_value,
        metadata: Some(EventMetadata::for_note(note_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(events: &[CandidateEvent]) -> Vec<EventType> {
        events.iter().map(|e| e.event_type).collect()
    }

    #[test]
    fn identical_states_produce_nothing() {
        let state = VisitState::new("<p>Plan</p>", "Done").with_note("n1", "call back");
        assert!(detect_changes(&state, &state.clone()).is_empty());
        assert!(detect_changes(&VisitState::default(), &VisitState::default()).is_empty());
    }

    #[test]
    fn formatting_only_agenda_change_is_ignored() {
        let before = VisitState::new("<p>Plan A</p>", "");
        let after = VisitState::new("Plan A", "");
        assert!(detect_changes(&before, &after).is_empty());
    }

    #[test]
    fn agenda_change_emits_normalized_values() {
        let before = VisitState::new("<p>Plan A</p>", "");
        let after = VisitState::new("<p>Plan <b>B</b></p>", "");
        let events = detect_changes(&before, &after);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::AgendaEdit);
        assert_eq!(events[0].before_value, "Plan A");
        assert_eq!(events[0].after_value, "Plan B");
        assert_eq!(events[0].metadata, None);
    }

    #[test]
    fn debrief_only_change_is_isolated() {
        let before = VisitState::new("Agenda", "Old").with_note("n1", "x");
        let mut after = before.clone();
        after.debrief = "New".into();
        let events = detect_changes(&before, &after);
        assert_eq!(types(&events), vec![EventType::DebriefEdit]);
        assert_eq!(events[0].before_value, "Old");
        assert_eq!(events[0].after_value, "New");
    }

    #[test]
    fn note_add_edit_delete_are_detected() {
        let before = VisitState::default()
            .with_note("keep", "same")
            .with_note("edit", "<p>draft</p>")
            .with_note("drop", "obsolete");
        let after = VisitState::default()
            .with_note("keep", "<p>same</p>")
            .with_note("edit", "final")
            .with_note("new", "fresh");

        let events = detect_changes(&before, &after);
        assert_eq!(
            types(&events),
            vec![EventType::NoteEdit, EventType::NoteAdd, EventType::NoteDelete]
        );

        assert_eq!(events[0].before_value, "draft");
        assert_eq!(events[0].after_value, "final");
        assert_eq!(events[0].metadata, Some(EventMetadata::for_note("edit")));

        assert_eq!(events[1].before_value, "");
        assert_eq!(events[1].after_value, "fresh");
        assert_eq!(events[1].metadata, Some(EventMetadata::for_note("new")));

        assert_eq!(events[2].before_value, "obsolete");
        assert_eq!(events[2].after_value, "");
        assert_eq!(events[2].metadata, Some(EventMetadata::for_note("drop")));
    }

    #[test]
    fn fields_are_emitted_in_fixed_order() {
        let before = VisitState::new("a", "b").with_note("gone", "x");
        let after = VisitState::new("a2", "b2").with_note("added", "y");
        assert_eq!(
            types(&detect_changes(&before, &after)),
            vec![
                EventType::AgendaEdit,
                EventType::DebriefEdit,
                EventType::NoteAdd,
                EventType::NoteDelete,
            ]
        );
    }

    #[test]
    fn missing_before_is_treated_as_empty() {
        let after = VisitState::new("First agenda", "").with_note("n1", "hi");
        let events = detect_changes(&VisitState::default(), &after);
        assert_eq!(types(&events), vec![EventType::AgendaEdit, EventType::NoteAdd]);
        assert_eq!(events[0].before_value, "");
    }

    #[test]
    fn clearing_a_field_is_an_edit() {
        let before = VisitState::new("", "Long debrief");
        let after = VisitState::default();
        let events = detect_changes(&before, &after);
        assert_eq!(types(&events), vec![EventType::DebriefEdit]);
        assert_eq!(events[0].after_value, "");
    }

    #[test]
    fn revert_to_older_text_still_counts() {
        let v1 = VisitState::new("Plan A", "");
        let v2 = VisitState::new("Plan B", "");
        assert_eq!(detect_changes(&v1, &v2).len(), 1);
        assert_eq!(detect_changes(&v2, &v1).len(), 1);
    }

    #[test]
    fn reordering_notes_is_not_a_change() {
        let before = VisitState::default().with_note("a", "1").with_note("b", "2");
        let after = VisitState::default().with_note("b", "2").with_note("a", "1");
        assert!(detect_changes(&before, &after).is_empty());
    }

    #[test]
    fn duplicate_note_ids_are_diffed_once() {
        let before = VisitState::default().with_note("a", "old").with_note("a", "newer");
        let after = VisitState::default().with_note("a", "newer");
        assert!(detect_changes(&before, &after).is_empty());
    }
}
