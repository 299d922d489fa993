//! Keyed local snapshot of the whole store.
//!
//! # Responsibility
//! - Persist each entity collection as one JSON document under a fixed key.
//! - Report missing keys so callers can fall back to seed data.
//!
//! # Invariants
//! - A batch of writes is applied in one transaction: all keys or none.
//! - Values are stored exactly as serialized; no field renaming happens here.

use crate::db::{open_db, open_db_in_memory, DbError};
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Logical record names of the local snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKey {
    Users,
    Tasks,
    Notifications,
    CurrentUser,
    Theme,
}

impl SnapshotKey {
    pub const ALL: [SnapshotKey; 5] = [
        SnapshotKey::Users,
        SnapshotKey::Tasks,
        SnapshotKey::Notifications,
        SnapshotKey::CurrentUser,
        SnapshotKey::Theme,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Users => "taskflow_users",
            Self::Tasks => "taskflow_tasks",
            Self::Notifications => "taskflow_notifications",
            Self::CurrentUser => "taskflow_current_user",
            Self::Theme => "taskflow_theme",
        }
    }
}

#[derive(Debug)]
pub enum SnapshotError {
    Db(DbError),
    /// A stored value could not be encoded or decoded.
    Serialization {
        key: SnapshotKey,
        source: serde_json::Error,
    },
}

impl Display for SnapshotError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialization { key, source } => {
                write!(f, "snapshot value `{}` is not valid: {source}", key.as_str())
            }
        }
    }
}

impl Error for SnapshotError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization { source, .. } => Some(source),
        }
    }
}

impl From<DbError> for SnapshotError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SnapshotError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One pending change to the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotWrite {
    Put { key: SnapshotKey, value: String },
    Remove(SnapshotKey),
}

impl SnapshotWrite {
    /// Serializes `value` into a `Put` for `key`.
    pub fn put<T: Serialize + ?Sized>(key: SnapshotKey, value: &T) -> SnapshotResult<Self> {
        let value = serde_json::to_string(value)
            .map_err(|source| SnapshotError::Serialization { key, source })?;
        Ok(Self::Put { key, value })
    }
}

/// SQLite-backed key/value snapshot.
pub struct LocalSnapshot {
    conn: Connection,
}

impl LocalSnapshot {
    /// Wraps an already-migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn open(path: impl AsRef<Path>) -> SnapshotResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> SnapshotResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    /// Returns the raw stored value for `key`.
    pub fn get_raw(&self, key: SnapshotKey) -> SnapshotResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM snapshot_entries WHERE key = ?1;",
                [key.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Decodes the value stored under `key`, or `None` when the key is absent.
    pub fn load<T: DeserializeOwned>(&self, key: SnapshotKey) -> SnapshotResult<Option<T>> {
        match self.get_raw(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| SnapshotError::Serialization { key, source }),
            None => Ok(None),
        }
    }

    /// Applies `writes` atomically.
    pub fn write_batch(&mut self, writes: &[SnapshotWrite]) -> SnapshotResult<()> {
        let tx = self.conn.transaction()?;
        for write in writes {
            match write {
                SnapshotWrite::Put { key, value } => {
                    tx.execute(
                        "INSERT INTO snapshot_entries (key, value, updated_at)
                         VALUES (?1, ?2, strftime('%s', 'now') * 1000)
                         ON CONFLICT(key) DO UPDATE SET
                            value = excluded.value,
                            updated_at = excluded.updated_at;",
                        params![key.as_str(), value.as_str()],
                    )?;
                }
                SnapshotWrite::Remove(key) => {
                    tx.execute(
                        "DELETE FROM snapshot_entries WHERE key = ?1;",
                        [key.as_str()],
                    )?;
                }
            }
        }

        if let Err(err) = tx.commit() {
            error!(
                "event=snapshot_write module=persistence status=error writes={} error={err}",
                writes.len()
            );
            return Err(err.into());
        }
        info!(
            "event=snapshot_write module=persistence status=ok writes={}",
            writes.len()
        );
        Ok(())
    }

    /// Returns which logical keys currently hold a value.
    pub fn present_keys(&self) -> SnapshotResult<Vec<SnapshotKey>> {
        let mut present = Vec::new();
        for key in SnapshotKey::ALL {
            if self.get_raw(key)?.is_some() {
                present.push(key);
            }
        }
        Ok(present)
    }
}

#[cfg(test)]
mod tests {
    use super::{LocalSnapshot, SnapshotError, SnapshotKey, SnapshotWrite};
    use crate::model::theme::Theme;

    #[test]
    fn missing_key_loads_as_none() {
        let snapshot = LocalSnapshot::open_in_memory().expect("snapshot should open");
        let theme: Option<Theme> = snapshot.load(SnapshotKey::Theme).expect("load");
        assert_eq!(theme, None);
    }

    #[test]
    fn put_then_remove_round_trips() {
        let mut snapshot = LocalSnapshot::open_in_memory().expect("snapshot should open");
        let write = SnapshotWrite::put(SnapshotKey::Theme, &Theme::Dark).expect("encode");
        snapshot.write_batch(&[write]).expect("write");
        assert_eq!(
            snapshot.load::<Theme>(SnapshotKey::Theme).expect("load"),
            Some(Theme::Dark)
        );
        assert_eq!(
            snapshot.get_raw(SnapshotKey::Theme).expect("raw").as_deref(),
            Some("\"dark\"")
        );

        snapshot
            .write_batch(&[SnapshotWrite::Remove(SnapshotKey::Theme)])
            .expect("remove");
        assert!(snapshot.present_keys().expect("keys").is_empty());
    }

    #[test]
    fn corrupt_value_reports_key() {
        let mut snapshot = LocalSnapshot::open_in_memory().expect("snapshot should open");
        snapshot
            .write_batch(&[SnapshotWrite::Put {
                key: SnapshotKey::Theme,
                value: "not json".to_string(),
            }])
            .expect("write raw");

        let err = snapshot
            .load::<Theme>(SnapshotKey::Theme)
            .expect_err("corrupt value should fail");
        assert!(matches!(
            err,
            SnapshotError::Serialization {
                key: SnapshotKey::Theme,
                ..
            }
        ));
    }
}
