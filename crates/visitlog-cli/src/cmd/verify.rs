//! `vl verify`: check the stored history of one entity for integrity.

use std::io::Write;
use std::path::Path;

use clap::Args;
use visitlog_core::verify::{VerifyReport, verify_entity};

use super::{open_session, validate_entity_id};
use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render_error, render_mode};

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Visit id to verify.
    pub entity: String,
}

/// Execute `vl verify <entity>`. Exits non-zero when any finding is reported.
///
/// # Errors
///
/// Returns an error if the store cannot be read or the history is unhealthy.
pub fn run_verify(
    args: &VerifyArgs,
    output: OutputMode,
    project_root: &Path,
    db_override: Option<&Path>,
) -> anyhow::Result<()> {
    validate_entity_id(&args.entity, output)?;
    let session = open_session(project_root, db_override, output)?;

    let report = match verify_entity(
        &session.store,
        &args.entity,
        session.config.history.batch_size,
    ) {
        Ok(report) => report,
        Err(err) => {
            render_error(output, &CliError::from_code(err.to_string(), err.code()))?;
            return Err(err.into());
        }
    };

    render_mode(output, &report, render_verify_text, render_verify_human)?;
    if !report.is_healthy() {
        anyhow::bail!(
            "{} integrity finding(s) for {}",
            report.findings.len(),
            report.entity_id
        );
    }
    Ok(())
}

fn render_verify_text(report: &VerifyReport, w: &mut dyn Write) -> std::io::Result<()> {
    if report.is_healthy() {
        return writeln!(w, "ok\t{}", report.entity_id);
    }
    for finding in &report.findings {
        writeln!(w, "finding\t{finding}")?;
    }
    Ok(())
}

fn render_verify_human(report: &VerifyReport, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("Verify {}", report.entity_id))?;
    pretty_kv(w, "Events", report.event_count.to_string())?;
    pretty_kv(w, "Snapshots", report.snapshot_count.to_string())?;
    pretty_kv(w, "Recent", report.tail_len.to_string())?;
    if report.is_healthy() {
        return writeln!(w, "\n✓ history is consistent");
    }
    writeln!(w)?;
    for finding in &report.findings {
        writeln!(w, "✗ {finding}")?;
    }
    Ok(())
}
