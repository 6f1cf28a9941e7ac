//! SQLite-backed [`HistoryStore`].
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so readers proceed while a writer appends
//! - `busy_timeout = 5s` to ride out short lock contention
//! - `foreign_keys = ON` so snapshot membership rows follow their snapshot
//!
//! Every write runs in an `IMMEDIATE` transaction. That takes the database
//! write lock up front, so the version check and the insert in
//! [`HistoryStore::insert_snapshot`] cannot interleave with another
//! process's compaction run.

pub mod migrations;
pub mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Context;
use rusqlite::{Connection, Row, TransactionBehavior, params, types::Type};

use super::{HistoryStore, IdGenerator, MonotonicClock, StoreError, validate_new_snapshot};
use crate::compact::{NewSnapshot, Snapshot};
use crate::event::{EventMetadata, EventType, HistoryEvent, NewEvent};

/// Busy timeout used for history DB connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const EVENT_COLUMNS: &str = "event_id, event_type, before_value, after_value, \
                             user_id, user_name, timestamp_us, note_id";

const SNAPSHOT_COLUMNS: &str =
    "snapshot_id, version, title, event_ids_json, event_count, summary, created_at_us";

/// Durable history store over a single SQLite connection.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    ids: IdGenerator,
    clock: MonotonicClock,
}

impl SqliteStore {
    /// Open (or create) the history database at `path`, apply runtime
    /// pragmas, and migrate the schema to the latest version.
    ///
    /// # Errors
    ///
    /// Returns an error if opening, configuring, or migrating fails.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("create history db directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("open history database {}", path.display()))?;
        Self::from_connection(conn)
            .with_context(|| format!("initialize history database {}", path.display()))
    }

    /// Open a private in-memory database. Used by tests and short-lived tools.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot create the database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self, StoreError> {
        configure_connection(&conn)?;
        migrations::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            ids: IdGenerator::new(),
            clock: MonotonicClock::new(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".into()))
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

fn conversion_error(
    column: usize,
    error: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(error))
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryEvent> {
    let raw_type: String = row.get(1)?;
    let event_type = raw_type
        .parse::<EventType>()
        .map_err(|e| conversion_error(1, e))?;
    let note_id: Option<String> = row.get(7)?;

    Ok(HistoryEvent {
        id: row.get(0)?,
        event_type,
        before_value: row.get(2)?,
        after_value: row.get(3)?,
        user_id: row.get(4)?,
        user_name: row.get(5)?,
        timestamp: row.get(6)?,
        metadata: note_id.map(EventMetadata::for_note),
    })
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<Snapshot> {
    let ids_json: String = row.get(3)?;
    let event_ids: Vec<String> =
        serde_json::from_str(&ids_json).map_err(|e| conversion_error(3, e))?;
    let event_count: i64 = row.get(4)?;
    let event_count = usize::try_from(event_count).map_err(|e| conversion_error(4, e))?;

    Ok(Snapshot {
        id: row.get(0)?,
        version: row.get(1)?,
        title: row.get(2)?,
        event_ids,
        event_count,
        summary: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl HistoryStore for SqliteStore {
    fn append_event(&self, entity_id: &str, event: NewEvent) -> Result<HistoryEvent, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Keep per-entity timestamps strictly increasing even across
        // processes sharing the file.
        let floor: i64 = tx.query_row(
            "SELECT COALESCE(MAX(timestamp_us), 0) FROM history_events WHERE entity_id = ?1",
            params![entity_id],
            |row| row.get(0),
        )?;
        let timestamp = self.clock.now_after(floor);
        let id = self.ids.next("ev", entity_id, timestamp);
        let note_id = event.metadata.as_ref().and_then(|m| m.note_id.clone());

        tx.execute(
            "INSERT INTO history_events (
                event_id, entity_id, event_type, before_value, after_value,
                user_id, user_name, timestamp_us, note_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                entity_id,
                event.event_type.as_str(),
                event.before_value,
                event.after_value,
                event.user_id,
                event.user_name,
                timestamp,
                note_id,
            ],
        )?;
        tx.commit()?;

        Ok(HistoryEvent::from_new(id, timestamp, event))
    }

    fn list_events(&self, entity_id: &str) -> Result<Vec<HistoryEvent>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM history_events WHERE entity_id = ?1"
        ))?;
        let events = stmt
            .query_map(params![entity_id], event_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    fn list_snapshots(&self, entity_id: &str) -> Result<Vec<Snapshot>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM history_snapshots WHERE entity_id = ?1"
        ))?;
        let snapshots = stmt
            .query_map(params![entity_id], snapshot_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(snapshots)
    }

    fn max_version(&self, entity_id: &str) -> Result<u32, StoreError> {
        let conn = self.lock()?;
        let version: u32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM history_snapshots WHERE entity_id = ?1",
            params![entity_id],
            |row| row.get(0),
        )?;
        Ok(version)
    }

    fn insert_snapshot(
        &self,
        entity_id: &str,
        snapshot: NewSnapshot,
    ) -> Result<Snapshot, StoreError> {
        validate_new_snapshot(entity_id, &snapshot)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let actual: u32 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM history_snapshots WHERE entity_id = ?1",
            params![entity_id],
            |row| row.get(0),
        )?;
        let expected = snapshot.version - 1;
        if actual != expected {
            return Err(StoreError::VersionConflict {
                entity_id: entity_id.to_string(),
                expected,
                actual,
            });
        }

        {
            let mut known = tx.prepare(
                "SELECT 1 FROM history_events WHERE entity_id = ?1 AND event_id = ?2",
            )?;
            let mut member = tx.prepare(
                "SELECT 1 FROM snapshot_members WHERE entity_id = ?1 AND event_id = ?2",
            )?;
            for event_id in &snapshot.event_ids {
                if !known.exists(params![entity_id, event_id])? {
                    return Err(StoreError::UnknownEvent {
                        entity_id: entity_id.to_string(),
                        event_id: event_id.clone(),
                    });
                }
                if member.exists(params![entity_id, event_id])? {
                    return Err(StoreError::EventsAlreadyCompacted {
                        entity_id: entity_id.to_string(),
                        event_id: event_id.clone(),
                    });
                }
            }
        }

        let created_at = self.clock.now();
        let snapshot_id = self.ids.next("snap", entity_id, created_at);
        let ids_json = serde_json::to_string(&snapshot.event_ids)?;
        let event_count = i64::try_from(snapshot.event_ids.len()).unwrap_or(i64::MAX);

        tx.execute(
            "INSERT INTO history_snapshots (
                snapshot_id, entity_id, version, title, event_ids_json,
                event_count, summary, created_at_us
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                snapshot_id,
                entity_id,
                snapshot.version,
                snapshot.title,
                ids_json,
                event_count,
                snapshot.summary,
                created_at,
            ],
        )?;

        {
            let mut insert_member = tx.prepare(
                "INSERT INTO snapshot_members (entity_id, event_id, snapshot_id, position)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, event_id) in (0_i64..).zip(&snapshot.event_ids) {
                insert_member.execute(params![entity_id, event_id, snapshot_id, position])?;
            }
        }
        tx.commit()?;

        Ok(Snapshot::from_new(snapshot_id, created_at, snapshot))
    }

    fn delete_events(&self, entity_id: &str) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let deleted = tx.execute(
            "DELETE FROM history_events WHERE entity_id = ?1",
            params![entity_id],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    fn delete_snapshots(&self, entity_id: &str) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "DELETE FROM snapshot_members WHERE entity_id = ?1",
            params![entity_id],
        )?;
        let deleted = tx.execute(
            "DELETE FROM history_snapshots WHERE entity_id = ?1",
            params![entity_id],
        )?;
        tx.commit()?;
        Ok(deleted)
    }
}
