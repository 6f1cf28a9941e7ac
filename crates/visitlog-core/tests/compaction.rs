//! End-to-end history flows over the in-memory store.
//!
//! Covers the capture → compact → read → erase lifecycle, failure recovery
//! through injected store faults, and concurrent compaction on one entity.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use visitlog_core::compact::{CompactError, compact_entity};
use visitlog_core::config::HistorySettings;
use visitlog_core::store::Fault;
use visitlog_core::verify::verify_entity;
use visitlog_core::{
    EditorIdentity, EraseReport, EventType, HistoryStore, MemoryStore, VisitState, erase_history,
    expand_snapshot, list_history, record_change,
};

fn editor() -> EditorIdentity {
    EditorIdentity::new("user-9", "Morgan Lee")
}

fn settings() -> HistorySettings {
    HistorySettings::default()
}

/// Apply `n` single-field debrief edits to `entity`.
fn edit_debrief_n_times(store: &MemoryStore, entity: &str, n: usize) {
    let mut state = VisitState::new("Quarterly review", "");
    for i in 1..=n {
        let next = VisitState::new("Quarterly review", format!("<p>Debrief draft {i}</p>"));
        let outcome = record_change(store, entity, &state, &next, &editor(), &settings());
        assert_eq!(outcome.captured.len(), 1, "edit {i} should capture one event");
        state = next;
    }
}

fn assert_disjoint(store: &MemoryStore, entity: &str) {
    let mut seen = HashSet::new();
    for snapshot in store.list_snapshots(entity).expect("snapshots") {
        for id in snapshot.event_ids {
            assert!(seen.insert(id.clone()), "event {id} is in two snapshots");
        }
    }
}

fn sorted_versions(store: &MemoryStore, entity: &str) -> Vec<u32> {
    let mut versions: Vec<u32> = store
        .list_snapshots(entity)
        .expect("snapshots")
        .iter()
        .map(|s| s.version)
        .collect();
    versions.sort_unstable();
    versions
}

#[test]
fn visit_42_lifecycle() {
    let store = MemoryStore::new();
    edit_debrief_n_times(&store, "visit-42", 23);

    let view = list_history(&store, "visit-42").expect("history");
    assert_eq!(view.snapshots.len(), 2);
    assert_eq!(view.snapshots[0].version, 2);
    assert_eq!(view.snapshots[1].version, 1);
    assert!(view.snapshots.iter().all(|s| s.event_count == 10));
    assert!(view.snapshots.iter().all(|s| s.summary == "10 debrief edits"));
    assert_eq!(view.recent_events.len(), 3);
    assert_eq!(view.recent_events[0].after_value, "Debrief draft 23");
    assert_eq!(view.recent_events[2].after_value, "Debrief draft 21");

    let v1 = &view.snapshots[1];
    let expanded = expand_snapshot(&store, "visit-42", &v1.id).expect("expand");
    assert_eq!(expanded.len(), 10);
    assert_eq!(expanded[0].after_value, "Debrief draft 1");
    assert_eq!(expanded[9].after_value, "Debrief draft 10");
    assert!(expanded.iter().all(|e| e.user_name == "Morgan Lee"));

    assert!(verify_entity(&store, "visit-42", 10).expect("verify").is_healthy());

    let report = erase_history(&store, "visit-42").expect("erase");
    assert_eq!(
        report,
        EraseReport {
            events_deleted: 23,
            snapshots_deleted: 2
        }
    );
    assert!(list_history(&store, "visit-42").expect("history").is_empty());
}

#[test]
fn formatting_only_edit_records_nothing() {
    let store = MemoryStore::new();
    let before = VisitState::new("<p>Plan A</p>", "");
    let after = VisitState::new("Plan A", "");
    let outcome = record_change(&store, "visit-1", &before, &after, &editor(), &settings());
    assert_eq!(outcome.detected, 0);
    assert!(store.list_events("visit-1").expect("events").is_empty());
}

#[test]
fn multi_field_save_records_each_change() {
    let store = MemoryStore::new();
    let before = VisitState::new("Agenda", "Debrief")
        .with_note("n1", "Keep")
        .with_note("n2", "Drop me");
    let after = VisitState::new("Agenda v2", "Debrief")
        .with_note("n1", "Keep")
        .with_note("n3", "Brand new");

    let outcome = record_change(&store, "visit-2", &before, &after, &editor(), &settings());
    let kinds: Vec<EventType> = outcome.captured.iter().map(|e| e.event_type).collect();
    assert_eq!(
        kinds,
        vec![EventType::AgendaEdit, EventType::NoteAdd, EventType::NoteDelete]
    );
    assert_eq!(outcome.captured[1].note_id(), Some("n3"));
    assert_eq!(outcome.captured[2].note_id(), Some("n2"));
    assert_eq!(outcome.captured[2].before_value, "Drop me");
    assert_eq!(outcome.captured[2].after_value, "");
}

#[test]
fn batch_completeness_holds_for_every_count() {
    for n in [0_usize, 1, 9, 10, 11, 19, 20, 31] {
        let store = MemoryStore::new();
        let entity = format!("visit-n{n}");
        edit_debrief_n_times(&store, &entity, n);

        let view = list_history(&store, &entity).expect("history");
        assert_eq!(view.snapshots.len(), n / 10, "snapshots for n={n}");
        assert_eq!(view.recent_events.len(), n % 10, "tail for n={n}");
        assert_eq!(
            sorted_versions(&store, &entity),
            (1..=u32::try_from(n / 10).expect("small")).collect::<Vec<_>>()
        );
        assert_disjoint(&store, &entity);
    }
}

#[test]
fn entities_do_not_share_history() {
    let store = MemoryStore::new();
    edit_debrief_n_times(&store, "visit-a", 12);
    edit_debrief_n_times(&store, "visit-b", 4);

    assert_eq!(list_history(&store, "visit-a").expect("a").snapshots.len(), 1);
    assert!(list_history(&store, "visit-b").expect("b").snapshots.is_empty());

    erase_history(&store, "visit-a").expect("erase a");
    assert_eq!(list_history(&store, "visit-b").expect("b").recent_events.len(), 4);
}

#[test]
fn failed_compaction_recovers_on_next_edit() {
    let store = MemoryStore::new();
    edit_debrief_n_times(&store, "visit-3", 9);

    // The 10th edit captures but its compaction fails.
    store.inject(Fault::InsertSnapshot);
    let before = VisitState::new("Quarterly review", "Debrief draft 9");
    let tenth = VisitState::new("Quarterly review", "Debrief draft 10");
    let outcome = record_change(&store, "visit-3", &before, &tenth, &editor(), &settings());
    assert_eq!(outcome.captured.len(), 1);
    assert!(outcome.compaction_error.is_some());
    assert_eq!(list_history(&store, "visit-3").expect("h").recent_events.len(), 10);

    // The 11th edit re-drives compaction from stored state.
    let eleventh = VisitState::new("Quarterly review", "Debrief draft 11");
    let outcome = record_change(&store, "visit-3", &tenth, &eleventh, &editor(), &settings());
    assert!(outcome.is_clean());
    assert_eq!(outcome.snapshots_created(), 1);

    let view = list_history(&store, "visit-3").expect("history");
    assert_eq!(view.snapshots.len(), 1);
    assert_eq!(view.recent_events.len(), 1);
    assert_eq!(view.recent_events[0].after_value, "Debrief draft 11");
}

#[test]
fn failed_run_is_recomputed_on_retry() {
    let store = MemoryStore::new();
    let no_compact = HistorySettings {
        compact_on_append: false,
        ..HistorySettings::default()
    };
    let mut state = VisitState::default();
    for i in 0..30 {
        let next = VisitState::new(format!("agenda {i}"), "");
        record_change(&store, "visit-4", &state, &next, &editor(), &no_compact);
        state = next;
    }

    // The version read before the first batch fails; nothing is written.
    store.inject(Fault::MaxVersion);
    let err = compact_entity(&store, "visit-4", 10).unwrap_err();
    assert!(matches!(err, CompactError::Persist { created: 0, .. }));

    let report = compact_entity(&store, "visit-4", 10).expect("retry");
    assert_eq!(report.snapshots_created.len(), 3);
    assert_eq!(sorted_versions(&store, "visit-4"), vec![1, 2, 3]);
    assert_eq!(report.tail_len, 0);
}

#[test]
fn rerunning_compaction_is_a_no_op() {
    let store = MemoryStore::new();
    edit_debrief_n_times(&store, "visit-5", 25);
    let report = compact_entity(&store, "visit-5", 10).expect("compact");
    assert!(report.snapshots_created.is_empty());
    assert_eq!(report.tail_len, 5);
    assert_eq!(sorted_versions(&store, "visit-5"), vec![1, 2]);
}

#[test]
fn concurrent_compaction_never_duplicates_versions() {
    let store = Arc::new(MemoryStore::new());
    let no_compact = HistorySettings {
        compact_on_append: false,
        ..HistorySettings::default()
    };
    let mut state = VisitState::default();
    for i in 0..40 {
        // One note_add, then one note_edit per save: 40 events in total.
        let next = VisitState::default().with_note("n", format!("text {i}"));
        record_change(store.as_ref(), "visit-6", &state, &next, &editor(), &no_compact);
        state = next;
    }

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || compact_entity(store.as_ref(), "visit-6", 10))
        })
        .collect();
    for handle in handles {
        if let Err(err) = handle.join().expect("thread") {
            assert!(
                matches!(err, CompactError::Persist { .. }),
                "unexpected error: {err}"
            );
        }
    }
    assert_eq!(store.list_events("visit-6").expect("events").len(), 40);

    // Losers left their batches for the next run.
    compact_entity(store.as_ref(), "visit-6", 10).expect("settle");
    assert_eq!(sorted_versions(&store, "visit-6"), vec![1, 2, 3, 4]);
    assert_disjoint(&store, "visit-6");
    assert!(verify_entity(store.as_ref(), "visit-6", 10).expect("verify").is_healthy());
}

#[test]
fn concurrent_editors_keep_invariants() {
    let store = Arc::new(MemoryStore::new());
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let who = EditorIdentity::new(format!("user-{t}"), format!("Editor {t}"));
                let mut state = VisitState::default();
                for i in 0..15 {
                    let next = VisitState::default().with_note(format!("t{t}"), format!("rev {i}"));
                    record_change(store.as_ref(), "visit-7", &state, &next, &who, &settings());
                    state = next;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread");
    }

    compact_entity(store.as_ref(), "visit-7", 10).expect("settle");
    let events = store.list_events("visit-7").expect("events");
    assert_eq!(events.len(), 60);
    assert_eq!(sorted_versions(&store, "visit-7"), vec![1, 2, 3, 4, 5, 6]);
    assert_disjoint(&store, "visit-7");
}

#[test]
fn erase_failure_is_not_success() {
    let store = MemoryStore::new();
    edit_debrief_n_times(&store, "visit-8", 11);
    store.inject(Fault::DeleteSnapshots);

    let err = erase_history(&store, "visit-8").unwrap_err();
    assert_eq!(err.partial.events_deleted, 11);
    assert_eq!(err.partial.snapshots_deleted, 0);

    let report = erase_history(&store, "visit-8").expect("retry");
    assert_eq!(report.events_deleted, 0);
    assert_eq!(report.snapshots_deleted, 1);
}
