use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::compact::DEFAULT_BATCH_SIZE;
use crate::error::ErrorCode;

/// Project directory holding the config file and the default database.
pub const PROJECT_DIR: &str = ".visitlog";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub history: HistorySettings,
    #[serde(default)]
    pub store: StoreSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_true")]
    pub compact_on_append: bool,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            compact_on_append: default_true(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl HistoryConfig {
    /// Database path, resolved against `project_root` when relative.
    #[must_use]
    pub fn store_path(&self, project_root: &Path) -> PathBuf {
        if self.store.path.is_absolute() {
            self.store.path.clone()
        } else {
            project_root.join(&self.store.path)
        }
    }

    /// Reject settings the history engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error when `batch_size` is 0.
    pub fn validate(&self) -> Result<()> {
        if self.history.batch_size == 0 {
            bail!(
                "{}: {} ({})",
                ErrorCode::InvalidBatchSize.code(),
                ErrorCode::InvalidBatchSize.message(),
                "history.batch_size = 0"
            );
        }
        Ok(())
    }
}

/// Load `.visitlog/config.toml` under `project_root`. A missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<HistoryConfig> {
    let path = project_root.join(PROJECT_DIR).join("config.toml");
    if !path.exists() {
        return Ok(HistoryConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<HistoryConfig>(&content).with_context(|| {
        format!(
            "{}: Failed to parse {}",
            ErrorCode::ConfigParseError.code(),
            path.display()
        )
    })
}

/// Load the project config, apply environment overrides, and validate.
///
/// # Errors
///
/// Returns an error for unreadable or malformed config, a non-numeric
/// `VISITLOG_BATCH_SIZE`, or a zero batch size.
pub fn resolve_config(project_root: &Path) -> Result<HistoryConfig> {
    let mut config = load_project_config(project_root)?;
    apply_env_overrides(
        &mut config,
        env::var("VISITLOG_BATCH_SIZE").ok(),
        env::var("VISITLOG_DB").ok(),
    )?;
    config.validate()?;
    Ok(config)
}

fn apply_env_overrides(
    config: &mut HistoryConfig,
    batch_size: Option<String>,
    db_path: Option<String>,
) -> Result<()> {
    if let Some(raw) = batch_size.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        config.history.batch_size = raw
            .parse()
            .with_context(|| format!("VISITLOG_BATCH_SIZE must be an integer, got '{raw}'"))?;
    }
    if let Some(path) = db_path.filter(|s| !s.trim().is_empty()) {
        config.store.path = PathBuf::from(path);
    }
    Ok(())
}

const fn default_true() -> bool {
    true
}

const fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_store_path() -> PathBuf {
    Path::new(PROJECT_DIR).join("history.sqlite3")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(root: &Path, body: &str) {
        let dir = root.join(PROJECT_DIR);
        std::fs::create_dir_all(&dir).expect("create config dir");
        std::fs::write(dir.join("config.toml"), body).expect("write config");
    }

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = tempfile::tempdir().expect("tempdir");
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.history.batch_size, 10);
        assert!(cfg.history.compact_on_append);
        assert_eq!(cfg.store.path, PathBuf::from(".visitlog/history.sqlite3"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let root = tempfile::tempdir().expect("tempdir");
        write_config(root.path(), "[history]\nbatch_size = 4\n");
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.history.batch_size, 4);
        assert!(cfg.history.compact_on_append);
        assert_eq!(cfg.store, StoreSettings::default());
    }

    #[test]
    fn full_config_parses() {
        let root = tempfile::tempdir().expect("tempdir");
        write_config(
            root.path(),
            r#"
[history]
batch_size = 25
compact_on_append = false

[store]
path = "/var/lib/visitlog/history.sqlite3"
"#,
        );
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.history.batch_size, 25);
        assert!(!cfg.history.compact_on_append);
        assert_eq!(
            cfg.store_path(root.path()),
            PathBuf::from("/var/lib/visitlog/history.sqlite3")
        );
    }

    #[test]
    fn malformed_config_is_an_error() {
        let root = tempfile::tempdir().expect("tempdir");
        write_config(root.path(), "[history\nbatch_size = ");
        let err = load_project_config(root.path()).unwrap_err();
        assert!(format!("{err:#}").contains("E1001"));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut cfg = HistoryConfig::default();
        cfg.history.batch_size = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("E1002"));
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut cfg = HistoryConfig::default();
        apply_env_overrides(&mut cfg, Some("3".into()), Some("/tmp/h.db".into()))
            .expect("overrides");
        assert_eq!(cfg.history.batch_size, 3);
        assert_eq!(cfg.store.path, PathBuf::from("/tmp/h.db"));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut cfg = HistoryConfig::default();
        apply_env_overrides(&mut cfg, Some("  ".into()), Some(String::new())).expect("overrides");
        assert_eq!(cfg, HistoryConfig::default());
    }

    #[test]
    fn non_numeric_batch_size_override_fails() {
        let mut cfg = HistoryConfig::default();
        assert!(apply_env_overrides(&mut cfg, Some("ten".into()), None).is_err());
    }

    #[test]
    fn relative_store_path_resolves_under_root() {
        let cfg = HistoryConfig::default();
        assert_eq!(
            cfg.store_path(Path::new("/srv/app")),
            PathBuf::from("/srv/app/.visitlog/history.sqlite3")
        );
    }
}
