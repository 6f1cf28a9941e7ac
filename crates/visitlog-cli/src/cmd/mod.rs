//! Command handlers for `vl`.

pub mod compact;
pub mod erase;
pub mod history;
pub mod record;
pub mod verify;

use std::path::Path;

use anyhow::Context;
use tracing::debug;
use visitlog_core::SqliteStore;
use visitlog_core::config::{HistoryConfig, resolve_config};

use crate::output::{CliError, OutputMode, render_error};

/// Everything a command needs: the resolved config and an open store.
pub struct Session {
    pub config: HistoryConfig,
    pub store: SqliteStore,
}

/// Resolve config under `project_root` and open the history database.
///
/// `db_override` (from `--db`) wins over `VISITLOG_DB` and the config file.
///
/// # Errors
///
/// Returns an error if the config is invalid or the database cannot be opened.
pub fn open_session(
    project_root: &Path,
    db_override: Option<&Path>,
    output: OutputMode,
) -> anyhow::Result<Session> {
    let config = match resolve_config(project_root) {
        Ok(config) => config,
        Err(err) => {
            render_error(
                output,
                &CliError::with_details(
                    format!("{err:#}"),
                    "fix .visitlog/config.toml or the VISITLOG_* environment",
                    "config_invalid",
                ),
            )?;
            return Err(err);
        }
    };

    let db_path = db_override.map_or_else(|| config.store_path(project_root), Path::to_path_buf);
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("open history store {}", db_path.display()))?;

    debug!(db = %db_path.display(), batch_size = config.history.batch_size, "opened history store");

    Ok(Session { config, store })
}

/// Validate a user-supplied entity id.
///
/// # Errors
///
/// Returns an error (after rendering it) when the id is blank.
pub fn validate_entity_id(raw: &str, output: OutputMode) -> anyhow::Result<()> {
    if raw.trim().is_empty() {
        render_error(
            output,
            &CliError::with_details(
                "entity id must not be empty",
                "pass the visit id, e.g. `visit-42`",
                "invalid_entity_id",
            ),
        )?;
        anyhow::bail!("entity id must not be empty");
    }
    Ok(())
}
