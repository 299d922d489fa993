//! Ordered schema scripts. The applied version lives in `PRAGMA user_version`.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::Connection;

/// Storage path a schema script belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaPart {
    /// Normalized tables read and written by `SqliteAdapter`.
    Relational,
    /// Keyed JSON records read and written by `LocalSnapshot`.
    Snapshot,
}

impl SchemaPart {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Relational => "relational",
            Self::Snapshot => "snapshot",
        }
    }
}

struct Migration {
    version: u32,
    part: SchemaPart,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        part: SchemaPart::Relational,
        sql: include_str!("0001_init.sql"),
    },
    Migration {
        version: 2,
        part: SchemaPart::Snapshot,
        sql: include_str!("0002_snapshot_entries.sql"),
    },
];

pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Current `user_version` of `conn`.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Brings `conn` up to `latest_version()` in a single transaction and
/// returns how many scripts ran.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the file is ahead of this build.
/// - `Migration` naming the first script that failed.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<usize> {
    let from = schema_version(conn)?;
    let latest = latest_version();
    if from > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: latest,
        });
    }

    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|migration| migration.version > from)
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    for migration in &pending {
        tx.execute_batch(migration.sql)
            .and_then(|()| tx.pragma_update(None, "user_version", migration.version))
            .map_err(|source| DbError::Migration {
                version: migration.version,
                part: migration.part,
                source,
            })?;
        debug!(
            "event=db_migrate_step module=db status=ok version={} part={}",
            migration.version,
            migration.part.as_str()
        );
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={from} to_version={latest} applied={}",
        pending.len()
    );
    Ok(pending.len())
}
