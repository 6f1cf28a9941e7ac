//! In-process [`HistoryStore`] with one-shot fault injection.
//!
//! State lives behind a single `Mutex`, which makes every trait method
//! atomic with respect to the others. Faults armed with
//! [`MemoryStore::inject`] fire on the next matching call and are then
//! cleared, which lets tests exercise the capture, compaction and erasure
//! failure paths without a real outage.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::{HistoryStore, IdGenerator, MonotonicClock, StoreError, validate_new_snapshot};
use crate::compact::{NewSnapshot, Snapshot};
use crate::event::{HistoryEvent, NewEvent};

/// Store operations that can be made to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Fail after `n` further successful appends.
    AppendEventAfter(usize),
    InsertSnapshot,
    MaxVersion,
    ListEvents,
    DeleteEvents,
    DeleteSnapshots,
}

#[derive(Debug, Default)]
struct EntityLog {
    events: Vec<HistoryEvent>,
    snapshots: Vec<Snapshot>,
}

#[derive(Debug, Default)]
struct State {
    entities: BTreeMap<String, EntityLog>,
    faults: Vec<Fault>,
}

impl State {
    /// Consume an armed fault matching `want`, if any.
    fn trip(&mut self, want: Fault) -> bool {
        if let Some(pos) = self.faults.iter().position(|f| *f == want) {
            self.faults.remove(pos);
            return true;
        }
        false
    }

    /// Count down append faults; fires when the countdown is already zero.
    fn trip_append(&mut self) -> bool {
        let Some(pos) = self
            .faults
            .iter()
            .position(|f| matches!(f, Fault::AppendEventAfter(_)))
        else {
            return false;
        };
        match self.faults[pos] {
            Fault::AppendEventAfter(0) => {
                self.faults.remove(pos);
                true
            }
            Fault::AppendEventAfter(n) => {
                self.faults[pos] = Fault::AppendEventAfter(n - 1);
                false
            }
            _ => false,
        }
    }
}

/// Thread-safe in-memory history store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    ids: IdGenerator,
    clock: MonotonicClock,
}

fn injected(op: &str) -> StoreError {
    StoreError::Unavailable(format!("injected fault: {op}"))
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot fault.
    pub fn inject(&self, fault: Fault) {
        if let Ok(mut state) = self.state.lock() {
            state.faults.push(fault);
        }
    }

    /// Entity ids that currently have any history.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the state lock is poisoned.
    pub fn entities(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock()?.entities.keys().cloned().collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

impl HistoryStore for MemoryStore {
    fn append_event(&self, entity_id: &str, event: NewEvent) -> Result<HistoryEvent, StoreError> {
        let mut state = self.lock()?;
        if state.trip_append() {
            return Err(injected("append_event"));
        }

        let timestamp = self.clock.now();
        let id = self.ids.next("ev", entity_id, timestamp);
        let stored = HistoryEvent::from_new(id, timestamp, event);

        state
            .entities
            .entry(entity_id.to_string())
            .or_default()
            .events
            .push(stored.clone());
        Ok(stored)
    }

    fn list_events(&self, entity_id: &str) -> Result<Vec<HistoryEvent>, StoreError> {
        let mut state = self.lock()?;
        if state.trip(Fault::ListEvents) {
            return Err(injected("list_events"));
        }
        Ok(state
            .entities
            .get(entity_id)
            .map(|log| log.events.clone())
            .unwrap_or_default())
    }

    fn list_snapshots(&self, entity_id: &str) -> Result<Vec<Snapshot>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .entities
            .get(entity_id)
            .map(|log| log.snapshots.clone())
            .unwrap_or_default())
    }

    fn max_version(&self, entity_id: &str) -> Result<u32, StoreError> {
        let mut state = self.lock()?;
        if state.trip(Fault::MaxVersion) {
            return Err(injected("max_version"));
        }
        Ok(state
            .entities
            .get(entity_id)
            .and_then(|log| log.snapshots.iter().map(|s| s.version).max())
            .unwrap_or(0))
    }

    fn insert_snapshot(
        &self,
        entity_id: &str,
        snapshot: NewSnapshot,
    ) -> Result<Snapshot, StoreError> {
        validate_new_snapshot(entity_id, &snapshot)?;

        let mut state = self.lock()?;
        if state.trip(Fault::InsertSnapshot) {
            return Err(injected("insert_snapshot"));
        }

        let Some(log) = state.entities.get_mut(entity_id) else {
            return Err(StoreError::UnknownEvent {
                entity_id: entity_id.to_string(),
                event_id: snapshot.event_ids.first().cloned().unwrap_or_default(),
            });
        };

        let actual = log.snapshots.iter().map(|s| s.version).max().unwrap_or(0);
        let expected = snapshot.version - 1;
        if actual != expected {
            return Err(StoreError::VersionConflict {
                entity_id: entity_id.to_string(),
                expected,
                actual,
            });
        }

        let known: HashSet<&str> = log.events.iter().map(|e| e.id.as_str()).collect();
        let compacted: HashSet<&str> = log
            .snapshots
            .iter()
            .flat_map(|s| s.event_ids.iter().map(String::as_str))
            .collect();
        for id in &snapshot.event_ids {
            if !known.contains(id.as_str()) {
                return Err(StoreError::UnknownEvent {
                    entity_id: entity_id.to_string(),
                    event_id: id.clone(),
                });
            }
            if compacted.contains(id.as_str()) {
                return Err(StoreError::EventsAlreadyCompacted {
                    entity_id: entity_id.to_string(),
                    event_id: id.clone(),
                });
            }
        }

        let created_at = self.clock.now();
        let id = self.ids.next("snap", entity_id, created_at);
        let stored = Snapshot::from_new(id, created_at, snapshot);
        log.snapshots.push(stored.clone());
        Ok(stored)
    }

    fn delete_events(&self, entity_id: &str) -> Result<usize, StoreError> {
        let mut state = self.lock()?;
        if state.trip(Fault::DeleteEvents) {
            return Err(injected("delete_events"));
        }
        let Some(log) = state.entities.get_mut(entity_id) else {
            return Ok(0);
        };
        let deleted = std::mem::take(&mut log.events).len();
        if log.snapshots.is_empty() {
            state.entities.remove(entity_id);
        }
        Ok(deleted)
    }

    fn delete_snapshots(&self, entity_id: &str) -> Result<usize, StoreError> {
        let mut state = self.lock()?;
        if state.trip(Fault::DeleteSnapshots) {
            return Err(injected("delete_snapshots"));
        }
        let Some(log) = state.entities.get_mut(entity_id) else {
            return Ok(0);
        };
        let deleted = std::mem::take(&mut log.snapshots).len();
        if log.events.is_empty() {
            state.entities.remove(entity_id);
        }
        Ok(deleted)
    }
}
