//! SQLite schema for the history store.
//!
//! - `history_events` holds the append-only log, one row per event
//! - `history_snapshots` holds compacted batches; `UNIQUE(entity_id, version)`
//!   backs the no-duplicate-version rule
//! - `snapshot_members` maps each compacted event to its snapshot; its
//!   primary key backs the no-double-compaction rule

/// Migration v1: events, snapshots, snapshot membership, and read-path indexes.
pub const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS history_events (
    event_id TEXT PRIMARY KEY,
    entity_id TEXT NOT NULL CHECK (length(entity_id) > 0),
    event_type TEXT NOT NULL CHECK (
        event_type IN ('agenda_edit', 'debrief_edit', 'note_add', 'note_edit', 'note_delete')
    ),
    before_value TEXT NOT NULL,
    after_value TEXT NOT NULL,
    user_id TEXT NOT NULL,
    user_name TEXT NOT NULL,
    timestamp_us INTEGER NOT NULL,
    note_id TEXT
);

CREATE TABLE IF NOT EXISTS history_snapshots (
    snapshot_id TEXT PRIMARY KEY,
    entity_id TEXT NOT NULL CHECK (length(entity_id) > 0),
    version INTEGER NOT NULL CHECK (version >= 1),
    title TEXT NOT NULL,
    event_ids_json TEXT NOT NULL,
    event_count INTEGER NOT NULL CHECK (event_count >= 1),
    summary TEXT NOT NULL,
    created_at_us INTEGER NOT NULL,
    UNIQUE (entity_id, version)
);

CREATE TABLE IF NOT EXISTS snapshot_members (
    entity_id TEXT NOT NULL,
    event_id TEXT NOT NULL,
    snapshot_id TEXT NOT NULL REFERENCES history_snapshots(snapshot_id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    PRIMARY KEY (entity_id, event_id)
);

CREATE INDEX IF NOT EXISTS idx_history_events_entity
    ON history_events(entity_id, timestamp_us);

CREATE INDEX IF NOT EXISTS idx_snapshot_members_snapshot
    ON snapshot_members(snapshot_id);
"#;

/// Indexes expected by the per-entity read paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_history_events_entity",
    "idx_snapshot_members_snapshot",
];
