//! `vl compact`: run snapshot compaction for one entity on demand.
//!
//! Normally compaction runs after every recorded edit. This command exists
//! for backfills and for recovering after a failed run without waiting for
//! the next edit.

use std::io::Write;
use std::path::Path;

use clap::Args;
use visitlog_core::{CompactionReport, compact_entity};

use super::{open_session, validate_entity_id};
use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render_error, render_mode};

#[derive(Args, Debug)]
pub struct CompactArgs {
    /// Visit id to compact.
    pub entity: String,

    /// Override the configured batch size for this run.
    #[arg(long)]
    pub batch_size: Option<usize>,
}

/// Execute `vl compact <entity>`.
///
/// # Errors
///
/// Returns an error if compaction fails. Snapshots created before the
/// failure are kept.
pub fn run_compact(
    args: &CompactArgs,
    output: OutputMode,
    project_root: &Path,
    db_override: Option<&Path>,
) -> anyhow::Result<()> {
    validate_entity_id(&args.entity, output)?;
    let session = open_session(project_root, db_override, output)?;
    let batch_size = args
        .batch_size
        .unwrap_or(session.config.history.batch_size);

    let report = match compact_entity(&session.store, &args.entity, batch_size) {
        Ok(report) => report,
        Err(err) => {
            render_error(output, &CliError::from_code(err.to_string(), err.code()))?;
            return Err(err.into());
        }
    };

    render_mode(output, &report, render_compact_text, render_compact_human)
}

fn render_compact_text(report: &CompactionReport, w: &mut dyn Write) -> std::io::Result<()> {
    for snapshot in &report.snapshots_created {
        writeln!(
            w,
            "{}\tv{}\t{}\t{}",
            snapshot.id, snapshot.version, snapshot.event_count, snapshot.summary
        )?;
    }
    writeln!(w, "tail\t{}", report.tail_len)
}

fn render_compact_human(report: &CompactionReport, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("Compaction for {}", report.entity_id))?;
    if report.snapshots_created.is_empty() {
        writeln!(w, "Nothing to compact")?;
    }
    for snapshot in &report.snapshots_created {
        writeln!(
            w,
            "{:<12} {}  {}",
            snapshot.title, snapshot.id, snapshot.summary
        )?;
    }
    pretty_kv(w, "Compacted", report.events_compacted.to_string())?;
    pretty_kv(w, "Recent", report.tail_len.to_string())
}
