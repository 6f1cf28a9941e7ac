//! `vl erase`: delete all history for one entity.

use std::io::Write;
use std::path::Path;

use clap::Args;
use serde::Serialize;
use visitlog_core::{EraseReport, erase_history};

use super::{open_session, validate_entity_id};
use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render_error, render_mode};

#[derive(Args, Debug)]
pub struct EraseArgs {
    /// Visit id whose history is deleted.
    pub entity: String,

    /// Confirm the deletion. Erasure cannot be undone.
    #[arg(long)]
    pub yes: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EraseOutput {
    entity_id: String,
    #[serde(flatten)]
    report: EraseReport,
}

/// Execute `vl erase <entity> --yes`.
///
/// # Errors
///
/// Returns an error without `--yes`, or when either deletion phase fails.
/// A failure reports the counts deleted before it.
pub fn run_erase(
    args: &EraseArgs,
    output: OutputMode,
    project_root: &Path,
    db_override: Option<&Path>,
) -> anyhow::Result<()> {
    validate_entity_id(&args.entity, output)?;
    if !args.yes {
        render_error(
            output,
            &CliError::with_details(
                format!("refusing to erase history for {} without --yes", args.entity),
                format!("re-run as `vl erase {} --yes`", args.entity),
                "confirmation_required",
            ),
        )?;
        anyhow::bail!("erase requires --yes");
    }

    let session = open_session(project_root, db_override, output)?;
    let report = match erase_history(&session.store, &args.entity) {
        Ok(report) => report,
        Err(err) => {
            render_error(
                output,
                &CliError::with_details(
                    err.to_string(),
                    format!(
                        "re-run `vl erase {} --yes` to finish; deleted so far: {} event(s), {} snapshot(s)",
                        args.entity, err.partial.events_deleted, err.partial.snapshots_deleted
                    ),
                    err.code().code(),
                ),
            )?;
            return Err(err.into());
        }
    };

    let out = EraseOutput {
        entity_id: args.entity.clone(),
        report,
    };
    render_mode(
        output,
        &out,
        |o, w| {
            writeln!(
                w,
                "{}\t{}\t{}",
                o.entity_id, o.report.events_deleted, o.report.snapshots_deleted
            )
        },
        render_erase_human,
    )
}

fn render_erase_human(out: &EraseOutput, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("Erased history for {}", out.entity_id))?;
    pretty_kv(w, "Events", out.report.events_deleted.to_string())?;
    pretty_kv(w, "Snapshots", out.report.snapshots_deleted.to_string())
}
