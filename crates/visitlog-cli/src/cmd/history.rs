//! `vl history` and `vl expand`: read an entity's history.

use std::io::Write;
use std::path::Path;

use clap::Args;
use serde::Serialize;
use visitlog_core::{HistoryError, HistoryEvent, HistoryView, expand_snapshot, list_history};

use super::{open_session, validate_entity_id};
use crate::output::{
    CliError, OutputMode, micros_to_local_datetime, pretty_kv, pretty_rule, pretty_section,
    render_error, render_mode,
};

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Visit id to show.
    pub entity: String,
}

#[derive(Args, Debug)]
pub struct ExpandArgs {
    /// Visit id owning the snapshot.
    pub entity: String,

    /// Snapshot id as shown by `vl history`.
    pub snapshot_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryOutput {
    entity_id: String,
    #[serde(flatten)]
    view: HistoryView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExpandOutput {
    entity_id: String,
    snapshot_id: String,
    events: Vec<HistoryEvent>,
}

/// Execute `vl history <entity>`.
///
/// # Errors
///
/// Returns an error if the store cannot be read or output fails.
pub fn run_history(
    args: &HistoryArgs,
    output: OutputMode,
    project_root: &Path,
    db_override: Option<&Path>,
) -> anyhow::Result<()> {
    validate_entity_id(&args.entity, output)?;
    let session = open_session(project_root, db_override, output)?;

    let view = match list_history(&session.store, &args.entity) {
        Ok(view) => view,
        Err(err) => {
            render_error(output, &CliError::from_code(err.to_string(), err.code()))?;
            return Err(err.into());
        }
    };

    let report = HistoryOutput {
        entity_id: args.entity.clone(),
        view,
    };
    render_mode(output, &report, render_history_text, render_history_human)
}

/// Execute `vl expand <entity> <snapshot-id>`.
///
/// # Errors
///
/// Returns an error for an unknown snapshot id or a store failure.
pub fn run_expand(
    args: &ExpandArgs,
    output: OutputMode,
    project_root: &Path,
    db_override: Option<&Path>,
) -> anyhow::Result<()> {
    validate_entity_id(&args.entity, output)?;
    let session = open_session(project_root, db_override, output)?;

    let events = match expand_snapshot(&session.store, &args.entity, &args.snapshot_id) {
        Ok(events) => events,
        Err(err) => {
            let cli_error = match err {
                HistoryError::SnapshotNotFound { .. } => CliError::with_details(
                    format!(
                        "snapshot '{}' not found for {}",
                        args.snapshot_id, args.entity
                    ),
                    format!("run `vl history {}` to list snapshot ids", args.entity),
                    err.code().code(),
                ),
                HistoryError::Store(_) => CliError::from_code(err.to_string(), err.code()),
            };
            render_error(output, &cli_error)?;
            return Err(err.into());
        }
    };

    let report = ExpandOutput {
        entity_id: args.entity.clone(),
        snapshot_id: args.snapshot_id.clone(),
        events,
    };
    render_mode(
        output,
        &report,
        |r, w| write_event_rows(&r.events, w),
        |r, w| {
            pretty_section(w, &format!("Snapshot {} ({})", r.snapshot_id, r.entity_id))?;
            write_event_lines(&r.events, w)
        },
    )
}

fn write_event_rows(events: &[HistoryEvent], w: &mut dyn Write) -> std::io::Result<()> {
    for event in events {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}",
            event.id,
            event.timestamp,
            event.event_type,
            event.user_name,
            event.preview(60)
        )?;
    }
    Ok(())
}

fn write_event_lines(events: &[HistoryEvent], w: &mut dyn Write) -> std::io::Result<()> {
    for event in events {
        writeln!(
            w,
            "{}  {:<13} {:<16} {}",
            micros_to_local_datetime(event.timestamp),
            event.event_type.as_str(),
            event.user_name,
            event.preview(40)
        )?;
    }
    Ok(())
}

fn render_history_text(report: &HistoryOutput, w: &mut dyn Write) -> std::io::Result<()> {
    write_event_rows(&report.view.recent_events, w)?;
    for snapshot in &report.view.snapshots {
        writeln!(
            w,
            "{}\tv{}\t{}\t{}",
            snapshot.id, snapshot.version, snapshot.event_count, snapshot.summary
        )?;
    }
    Ok(())
}

fn render_history_human(report: &HistoryOutput, w: &mut dyn Write) -> std::io::Result<()> {
    let view = &report.view;
    if view.is_empty() {
        writeln!(w, "No history for {}", report.entity_id)?;
        return Ok(());
    }

    pretty_section(w, &format!("Recent Edits ({})", report.entity_id))?;
    if view.recent_events.is_empty() {
        writeln!(w, "(none)")?;
    } else {
        write_event_lines(&view.recent_events, w)?;
    }

    for snapshot in &view.snapshots {
        writeln!(w)?;
        pretty_section(w, &snapshot.title)?;
        pretty_kv(w, "Id", &snapshot.id)?;
        pretty_kv(w, "Created", micros_to_local_datetime(snapshot.created_at))?;
        pretty_kv(w, "Events", snapshot.event_count.to_string())?;
        pretty_kv(w, "Summary", &snapshot.summary)?;
    }

    if view.missing_references > 0 {
        writeln!(w)?;
        pretty_rule(w)?;
        writeln!(
            w,
            "warning: {} snapshot reference(s) point at missing events; run `vl verify {}`",
            view.missing_references, report.entity_id
        )?;
    }
    Ok(())
}
