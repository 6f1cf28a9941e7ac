//! visitlog-core library.
//!
//! Edit history for visit records: a per-entity append-only event log,
//! content-based change detection, and compaction of the log into
//! fixed-size, versioned snapshots.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums at each seam; `anyhow::Result` for
//!   configuration loading.
//! - **Logging**: `tracing` macros with `entity_id` as a structured field.

pub mod compact;
pub mod config;
pub mod detect;
pub mod error;
pub mod event;
pub mod history;
pub mod model;
pub mod recorder;
pub mod store;
pub mod text;
pub mod verify;

pub use compact::{CompactError, CompactionReport, NewSnapshot, Snapshot, compact_entity};
pub use detect::detect_changes;
pub use event::{CandidateEvent, EventMetadata, EventType, HistoryEvent, NewEvent};
pub use history::{
    EraseError, EraseReport, HistoryError, HistoryView, erase_history, expand_snapshot,
    list_history,
};
pub use model::{EditorIdentity, Note, VisitState};
pub use recorder::{RecordOutcome, record_change};
pub use store::{HistoryStore, MemoryStore, SqliteStore, StoreError};
