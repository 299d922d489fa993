//! File logging for TaskFlow processes.
//!
//! Store and adapter events are `key=value` lines carrying ids, counts and
//! statuses. Task titles, comment text, notification messages and passwords
//! never reach the log.
//!
//! # Invariants
//! - At most one file logger per process. Asking again for the same target
//!   is a no-op; asking for a different one is a `LoggingError::Conflict`.

use crate::config::CoreConfig;
use flexi_logger::{
    Cleanup, Criterion, FileSpec, FlexiLoggerError, Logger, LoggerHandle, Naming, WriteMode,
};
use log::info;
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "taskflow";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEEP_ROTATED_FILES: usize = 5;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();

struct ActiveLogger {
    target: LogTarget,
    _handle: LoggerHandle,
}

/// Level and directory of the process file logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTarget {
    pub level: &'static str,
    pub dir: PathBuf,
}

#[derive(Debug)]
pub enum LoggingError {
    InvalidLevel(String),
    RelativeDir(PathBuf),
    /// A logger with other settings is already running.
    Conflict {
        active: LogTarget,
        requested: LogTarget,
    },
    CreateDir {
        dir: PathBuf,
        source: io::Error,
    },
    Backend(FlexiLoggerError),
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLevel(message) => write!(f, "{message}"),
            Self::RelativeDir(dir) => {
                write!(f, "log directory must be absolute, got `{}`", dir.display())
            }
            Self::Conflict { active, requested } => write!(
                f,
                "file logging already runs at level `{}` in `{}`; cannot switch to level `{}` in `{}`",
                active.level,
                active.dir.display(),
                requested.level,
                requested.dir.display()
            ),
            Self::CreateDir { dir, source } => write!(
                f,
                "cannot create log directory `{}`: {source}",
                dir.display()
            ),
            Self::Backend(err) => write!(f, "logger backend failed to start: {err}"),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDir { source, .. } => Some(source),
            Self::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<FlexiLoggerError> for LoggingError {
    fn from(value: FlexiLoggerError) -> Self {
        Self::Backend(value)
    }
}

/// Starts rotating file logs (`taskflow*.log`) in `log_dir`.
///
/// # Errors
/// - `InvalidLevel` / `RelativeDir` for bad arguments.
/// - `Conflict` when a logger with another level or directory is running.
/// - `CreateDir` / `Backend` when the logger cannot start.
pub fn init_logging(level: &str, log_dir: &Path) -> Result<(), LoggingError> {
    let requested = LogTarget {
        level: normalize_level(level).map_err(LoggingError::InvalidLevel)?,
        dir: log_dir.to_path_buf(),
    };
    if !requested.dir.is_absolute() {
        return Err(LoggingError::RelativeDir(requested.dir));
    }

    let active = ACTIVE.get_or_try_init(|| start(&requested))?;
    if active.target != requested {
        return Err(LoggingError::Conflict {
            active: active.target.clone(),
            requested,
        });
    }
    Ok(())
}

/// Starts file logging when `config.log_dir` is set and records which
/// storage backend this process runs against.
///
/// Returns `Ok(false)` when no log directory is configured.
pub fn init_from_config(config: &CoreConfig) -> Result<bool, LoggingError> {
    let Some(log_dir) = &config.log_dir else {
        return Ok(false);
    };
    init_logging(config.log_level, log_dir)?;
    info!(
        "event=config_loaded module=logging status=ok storage={} db_path={}",
        config.storage.as_str(),
        config.db_path.display()
    );
    Ok(true)
}

/// The running file logger, if any.
pub fn logging_status() -> Option<LogTarget> {
    ACTIVE.get().map(|active| active.target.clone())
}

/// `debug` in debug builds, `info` in release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

pub(crate) fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

fn start(target: &LogTarget) -> Result<ActiveLogger, LoggingError> {
    std::fs::create_dir_all(&target.dir).map_err(|source| LoggingError::CreateDir {
        dir: target.dir.clone(),
        source,
    })?;

    let handle = Logger::try_with_str(target.level)?
        .log_to_file(
            FileSpec::default()
                .directory(target.dir.clone())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEEP_ROTATED_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()?;

    info!(
        "event=logging_start module=logging status=ok level={} log_dir={} version={} platform={}",
        target.level,
        target.dir.display(),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    );
    Ok(ActiveLogger {
        target: target.clone(),
        _handle: handle,
    })
}

#[cfg(test)]
mod tests {
    use super::{init_from_config, init_logging, logging_status, normalize_level, LoggingError};
    use crate::config::{CoreConfig, StorageMode};
    use std::path::{Path, PathBuf};

    fn scratch_dir(suffix: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "taskflow-logging-{suffix}-{}",
            std::process::id()
        ))
    }

    #[test]
    fn normalize_level_accepts_known_values() {
        assert_eq!(normalize_level("INFO").unwrap(), "info");
        assert_eq!(normalize_level(" warning ").unwrap(), "warn");
        assert!(normalize_level("verbose").is_err());
    }

    #[test]
    fn relative_directory_is_rejected_before_starting() {
        let err = init_logging("info", Path::new("logs/dev")).unwrap_err();
        assert!(matches!(err, LoggingError::RelativeDir(_)));
    }

    #[test]
    fn init_from_config_without_log_dir_is_a_no_op() {
        let config = CoreConfig {
            log_dir: None,
            ..CoreConfig::default()
        };
        assert!(!init_from_config(&config).unwrap());
    }

    #[test]
    fn second_init_must_match_the_running_logger() {
        let log_dir = scratch_dir("active");
        let config = CoreConfig {
            log_level: "info",
            log_dir: Some(log_dir.clone()),
            storage: StorageMode::Sqlite,
            ..CoreConfig::default()
        };

        assert!(init_from_config(&config).unwrap());
        init_logging("INFO", &log_dir).unwrap();

        let level_conflict = init_logging("debug", &log_dir).unwrap_err();
        assert!(matches!(level_conflict, LoggingError::Conflict { .. }));
        let dir_conflict = init_logging("info", &scratch_dir("other")).unwrap_err();
        assert!(matches!(
            dir_conflict,
            LoggingError::Conflict { ref active, .. } if active.dir == log_dir
        ));

        let status = logging_status().unwrap();
        assert_eq!(status.level, "info");
        assert_eq!(status.dir, log_dir);
    }
}
