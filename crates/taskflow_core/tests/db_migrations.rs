use taskflow_core::db::migrations::{latest_version, schema_version};
use taskflow_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn).unwrap(), latest_version());
    assert_table_exists(&conn, "users");
    assert_table_exists(&conn, "tasks");
    assert_table_exists(&conn, "comments");
    assert_table_exists(&conn, "notifications");
    assert_table_exists(&conn, "snapshot_entries");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskflow.sqlite3");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first).unwrap(), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second).unwrap(), latest_version());
    assert_table_exists(&conn_second, "tasks");
}

#[test]
fn foreign_keys_are_enforced() {
    let conn = open_db_in_memory().unwrap();

    let enabled: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(enabled, 1);

    let err = conn.execute(
        "INSERT INTO comments (id, task_id, author_id, body, created_at)
         VALUES ('c1', 'missing-task', 'missing-user', 'text', 0);",
        [],
    );
    assert!(err.is_err());
}

#[test]
fn task_status_check_rejects_unknown_values() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO users (id, name, email, password, role)
         VALUES ('u1', 'Ada', 'ada@example.com', 'pw', 'admin');",
        [],
    )
    .unwrap();

    let result = conn.execute(
        "INSERT INTO tasks (id, title, status, priority, assignee_id, creator_id, due_date, created_at)
         VALUES ('t1', 'x', 'blocked', 'high', 'u1', 'u1', '2024-01-01', 0);",
        [],
    );
    assert!(result.is_err());
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
