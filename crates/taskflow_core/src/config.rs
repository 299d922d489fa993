//! Process configuration read from `TASKFLOW_*` environment variables.
//!
//! # Invariants
//! - Blank values count as unset.
//! - Unknown values are rejected, never silently replaced by defaults.

use crate::logging::{default_log_level, normalize_level};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const ENV_LOG_LEVEL: &str = "TASKFLOW_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "TASKFLOW_LOG_DIR";
pub const ENV_DB_PATH: &str = "TASKFLOW_DB_PATH";
pub const ENV_STORAGE: &str = "TASKFLOW_STORAGE";

const DEFAULT_DB_FILE_NAME: &str = "taskflow.sqlite3";

/// Where the store keeps durable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// Keyed JSON snapshot (`snapshot_entries` table).
    #[default]
    Local,
    /// Normalized tables behind `SqliteAdapter`.
    Sqlite,
}

impl StorageMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Sqlite => "sqlite",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Some(Self::Local),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidLogLevel(String),
    /// Log directory must be absolute.
    RelativeLogDir(PathBuf),
    InvalidStorage(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLogLevel(message) => write!(f, "{ENV_LOG_LEVEL}: {message}"),
            Self::RelativeLogDir(path) => write!(
                f,
                "{ENV_LOG_DIR} must be an absolute path, got `{}`",
                path.display()
            ),
            Self::InvalidStorage(value) => write!(
                f,
                "{ENV_STORAGE}: unsupported value `{value}`; expected local|sqlite"
            ),
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub log_level: &'static str,
    /// File logging is enabled only when set.
    pub log_dir: Option<PathBuf>,
    pub db_path: PathBuf,
    pub storage: StorageMode,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: None,
            db_path: default_db_path(),
            storage: StorageMode::default(),
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        if let Some(level) = read(ENV_LOG_LEVEL) {
            config.log_level = normalize_level(&level).map_err(ConfigError::InvalidLogLevel)?;
        }
        if let Some(dir) = read(ENV_LOG_DIR) {
            let dir = PathBuf::from(dir);
            if !dir.is_absolute() {
                return Err(ConfigError::RelativeLogDir(dir));
            }
            config.log_dir = Some(dir);
        }
        if let Some(path) = read(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(storage) = read(ENV_STORAGE) {
            config.storage =
                StorageMode::parse(&storage).ok_or(ConfigError::InvalidStorage(storage))?;
        }
        Ok(config)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

fn default_db_path() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_DB_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig, StorageMode};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn config_from(pairs: &[(&str, &str)]) -> Result<CoreConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        CoreConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.storage, StorageMode::Local);
        assert!(config.db_path.ends_with("taskflow.sqlite3"));
    }

    #[test]
    fn reads_all_variables() {
        let log_dir = std::env::temp_dir().join("taskflow-logs");
        let config = config_from(&[
            ("TASKFLOW_LOG_LEVEL", " WARNING "),
            ("TASKFLOW_LOG_DIR", log_dir.to_str().unwrap()),
            ("TASKFLOW_DB_PATH", "/tmp/custom.sqlite3"),
            ("TASKFLOW_STORAGE", "SQLite"),
        ])
        .unwrap();

        assert_eq!(config.log_level, "warn");
        assert_eq!(config.log_dir, Some(log_dir));
        assert_eq!(config.db_path, PathBuf::from("/tmp/custom.sqlite3"));
        assert_eq!(config.storage, StorageMode::Sqlite);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = config_from(&[("TASKFLOW_STORAGE", "  "), ("TASKFLOW_LOG_DIR", "")]).unwrap();
        assert_eq!(config.storage, StorageMode::Local);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            config_from(&[("TASKFLOW_LOG_LEVEL", "loud")]),
            Err(ConfigError::InvalidLogLevel(_))
        ));
        assert!(matches!(
            config_from(&[("TASKFLOW_LOG_DIR", "logs/dev")]),
            Err(ConfigError::RelativeLogDir(_))
        ));
        let err = config_from(&[("TASKFLOW_STORAGE", "postgres")]).unwrap_err();
        assert_eq!(err, ConfigError::InvalidStorage("postgres".to_string()));
        assert!(err.to_string().contains("local|sqlite"));
    }
}
