//! SQLite connections shared by both storage modes.
//!
//! One schema file serves `SqliteAdapter` (the `users`, `tasks`, `comments`
//! and `notifications` tables) and `LocalSnapshot` (`snapshot_entries`).
//! Every connection from `open_db*` has foreign keys on and the schema at
//! `migrations::latest_version()`.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use migrations::SchemaPart;
pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// A schema script failed; the whole upgrade was rolled back.
    Migration {
        version: u32,
        part: SchemaPart,
        source: rusqlite::Error,
    },
    /// The file was written by a newer TaskFlow build.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite: {err}"),
            Self::Migration {
                version,
                part,
                source,
            } => write!(
                f,
                "schema upgrade to version {version} ({} tables) failed: {source}",
                part.as_str()
            ),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than this build supports ({latest_supported})"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) | Self::Migration { source: err, .. } => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
