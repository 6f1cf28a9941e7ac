//! `vl record`: capture the edits between two states of a visit.
//!
//! States are JSON objects `{agenda, debrief, notes: [{id, text}]}`. Missing
//! fields default to empty. A value starting with `@` is read from a file.

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use visitlog_core::{EditorIdentity, HistoryEvent, VisitState, record_change};

use super::{open_session, validate_entity_id};
use crate::output::{
    CliError, OutputMode, micros_to_local_datetime, pretty_kv, pretty_section, render_error,
    render_mode,
};

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Visit id whose history receives the events.
    pub entity: String,

    /// State before the save, as JSON or `@path`.
    #[arg(long, default_value = "{}")]
    pub before: String,

    /// State after the save, as JSON or `@path`.
    #[arg(long)]
    pub after: String,

    /// Id of the user who made the edit.
    #[arg(long)]
    pub user_id: String,

    /// Display name of the user who made the edit.
    #[arg(long)]
    pub user_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordOutput {
    entity_id: String,
    detected: usize,
    captured: Vec<HistoryEvent>,
    snapshots_created: Vec<String>,
    tail_len: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    capture_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    compaction_error: Option<String>,
}

/// Parse a state argument: inline JSON, or `@path` to a JSON file.
fn parse_state(raw: &str, label: &str) -> anyhow::Result<VisitState> {
    let (source, json) = match raw.strip_prefix('@') {
        Some(path) => (
            path.to_string(),
            std::fs::read_to_string(path).with_context(|| format!("read --{label} file {path}"))?,
        ),
        None => (format!("--{label}"), raw.to_string()),
    };
    serde_json::from_str(&json).with_context(|| format!("parse visit state from {source}"))
}

/// Execute `vl record`.
///
/// Capture and compaction failures are reported but do not undo anything
/// already written. A capture failure exits non-zero; a compaction failure
/// does not, since the next record retries it.
///
/// # Errors
///
/// Returns an error on bad input, store open failure, or capture failure.
pub fn run_record(
    args: &RecordArgs,
    output: OutputMode,
    project_root: &Path,
    db_override: Option<&Path>,
) -> anyhow::Result<()> {
    validate_entity_id(&args.entity, output)?;

    let states = parse_state(&args.before, "before")
        .and_then(|before| Ok((before, parse_state(&args.after, "after")?)));
    let (before, after) = match states {
        Ok(states) => states,
        Err(err) => {
            render_error(
                output,
                &CliError::with_details(
                    format!("{err:#}"),
                    "pass a JSON object like '{\"agenda\":\"...\",\"notes\":[]}' or @file.json",
                    "invalid_state",
                ),
            )?;
            return Err(err);
        }
    };

    let session = open_session(project_root, db_override, output)?;
    let editor = EditorIdentity::new(args.user_id.clone(), args.user_name.clone());
    let outcome = record_change(
        &session.store,
        &args.entity,
        &before,
        &after,
        &editor,
        &session.config.history,
    );

    let capture_failed = outcome.capture_error.is_some();
    let report = RecordOutput {
        entity_id: args.entity.clone(),
        detected: outcome.detected,
        snapshots_created: outcome
            .compaction
            .as_ref()
            .map(|c| c.snapshots_created.iter().map(|s| s.id.clone()).collect())
            .unwrap_or_default(),
        tail_len: outcome.compaction.as_ref().map(|c| c.tail_len),
        capture_error: outcome.capture_error.as_ref().map(ToString::to_string),
        compaction_error: outcome.compaction_error.as_ref().map(ToString::to_string),
        captured: outcome.captured,
    };

    render_mode(output, &report, render_record_text, render_record_human)?;

    if let Some(err) = outcome.capture_error {
        render_error(output, &CliError::from_code(err.to_string(), err.code()))?;
    }
    if capture_failed {
        anyhow::bail!(
            "captured {} of {} event(s) for {}",
            report.captured.len(),
            report.detected,
            report.entity_id
        );
    }
    Ok(())
}

fn render_record_text(report: &RecordOutput, w: &mut dyn Write) -> std::io::Result<()> {
    for event in &report.captured {
        writeln!(
            w,
            "{}\t{}\t{}",
            event.id,
            event.event_type,
            event.preview(60)
        )?;
    }
    for id in &report.snapshots_created {
        writeln!(w, "snapshot\t{id}")?;
    }
    if let Some(ref err) = report.compaction_error {
        writeln!(w, "compaction_error\t{err}")?;
    }
    Ok(())
}

fn render_record_human(report: &RecordOutput, w: &mut dyn Write) -> std::io::Result<()> {
    if report.detected == 0 {
        writeln!(w, "No content changes for {}", report.entity_id)?;
        return Ok(());
    }

    pretty_section(w, &format!("Recorded edits for {}", report.entity_id))?;
    for event in &report.captured {
        writeln!(
            w,
            "{}  {:<13} {}",
            micros_to_local_datetime(event.timestamp),
            event.event_type.as_str(),
            event.preview(48)
        )?;
    }
    writeln!(w)?;
    pretty_kv(
        w,
        "Captured",
        format!("{} of {}", report.captured.len(), report.detected),
    )?;
    if !report.snapshots_created.is_empty() {
        pretty_kv(w, "Snapshots", report.snapshots_created.join(", "))?;
    }
    if let Some(tail) = report.tail_len {
        pretty_kv(w, "Recent", tail.to_string())?;
    }
    if let Some(ref err) = report.compaction_error {
        pretty_kv(w, "Compaction", format!("failed, retried on next edit ({err})"))?;
    }
    Ok(())
}
