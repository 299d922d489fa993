use chrono::{NaiveDate, TimeZone, Utc};
use std::path::Path;
use std::sync::Arc;
use taskflow_core::persistence::snapshot::SnapshotWrite;
use taskflow_core::views::task_views::visible_tasks_for;
use taskflow_core::{
    CoreConfig, DomainStore, LocalSnapshot, ManualClock, NewComment, NewTask, Role, SnapshotKey,
    StorageMode, Theme,
};

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 9, 2, 10, 30, 0).unwrap(),
    ))
}

fn open_store(path: &Path) -> DomainStore {
    let snapshot = LocalSnapshot::open(path).unwrap();
    DomainStore::open_local(snapshot, clock()).unwrap()
}

#[test]
fn empty_snapshot_falls_back_to_seed_signed_out_light() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir.path().join("taskflow.sqlite3"));

    assert!(!store.users().is_empty());
    assert!(!store.tasks().is_empty());
    assert_eq!(store.notifications().len(), 1);
    assert!(!store.session().is_authenticated());
    assert_eq!(store.theme(), Theme::Light);
    assert!(store.users().iter().any(|user| user.role == Role::Admin));
}

#[test]
fn flush_and_reopen_restores_full_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskflow.sqlite3");

    let mut store = open_store(&path);
    let admin = store
        .users()
        .iter()
        .find(|user| user.role == Role::Admin)
        .cloned()
        .unwrap();
    store.login(&admin.email, &admin.password).unwrap();
    let due = NaiveDate::from_ymd_opt(2024, 10, 2).unwrap();
    let task = store
        .create_task(NewTask::new("Persist me", admin.id, admin.id, due))
        .unwrap();
    store
        .add_comment(task.id, NewComment::new("noted", admin.id))
        .unwrap();
    store.toggle_theme();

    assert!(store.is_pending(task.id));
    let report = store.flush().unwrap();
    assert!(report.confirmed >= 2);
    assert!(report.is_clean());
    assert!(!store.is_pending(task.id));
    let expected = store.state();
    store.close().unwrap();

    let reopened = open_store(&path);
    assert_eq!(reopened.state(), expected);
    assert_eq!(reopened.session().principal_id(), Some(admin.id));
    assert_eq!(reopened.theme(), Theme::Dark);
    assert_eq!(reopened.task(task.id).unwrap().comments[0].text, "noted");
}

#[test]
fn logout_removes_stored_principal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskflow.sqlite3");

    let mut store = open_store(&path);
    let user = store.users()[0].clone();
    store.login(&user.email, &user.password).unwrap();
    store.flush().unwrap();
    store.logout().unwrap();
    store.close().unwrap();

    let snapshot = LocalSnapshot::open(&path).unwrap();
    assert!(snapshot.get_raw(SnapshotKey::CurrentUser).unwrap().is_none());
    let reopened = DomainStore::open_local(snapshot, clock()).unwrap();
    assert!(!reopened.session().is_authenticated());
}

#[test]
fn missing_keys_fall_back_individually() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskflow.sqlite3");

    let mut snapshot = LocalSnapshot::open(&path).unwrap();
    snapshot
        .write_batch(&[
            SnapshotWrite::put(SnapshotKey::Theme, &Theme::Dark).unwrap(),
            SnapshotWrite::put(SnapshotKey::Notifications, &Vec::<serde_json::Value>::new())
                .unwrap(),
        ])
        .unwrap();

    let store = DomainStore::open_local(snapshot, clock()).unwrap();

    assert_eq!(store.theme(), Theme::Dark);
    assert!(store.notifications().is_empty());
    assert!(!store.users().is_empty());
    assert!(!store.tasks().is_empty());
}

#[test]
fn missing_users_key_keeps_stored_tasks_and_principal_resolvable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskflow.sqlite3");

    let mut store = open_store(&path);
    let employee = store
        .users()
        .iter()
        .find(|user| user.role == Role::Employee)
        .cloned()
        .unwrap();
    store.login(&employee.email, &employee.password).unwrap();
    store.close().unwrap();

    let mut snapshot = LocalSnapshot::open(&path).unwrap();
    snapshot
        .write_batch(&[SnapshotWrite::Remove(SnapshotKey::Users)])
        .unwrap();
    let reopened = DomainStore::open_local(snapshot, clock()).unwrap();

    assert!(!reopened.tasks().is_empty());
    let orphaned = reopened
        .tasks()
        .iter()
        .filter(|task| {
            reopened.user(task.assignee_id).is_none() || reopened.user(task.created_by).is_none()
        })
        .count();
    assert_eq!(orphaned, 0);
    assert_eq!(reopened.session().principal_id(), Some(employee.id));
    let principal = reopened.session().principal().unwrap();
    assert!(!visible_tasks_for(&reopened.snapshot(), principal).is_empty());
}

#[test]
fn stored_records_use_camel_case_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskflow.sqlite3");

    let mut store = open_store(&path);
    store.flush().unwrap();
    drop(store);

    let snapshot = LocalSnapshot::open(&path).unwrap();
    let raw = snapshot.get_raw(SnapshotKey::Tasks).unwrap().unwrap();
    let tasks: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let first = &tasks[0];
    assert!(first.get("assigneeId").is_some());
    assert!(first.get("createdBy").is_some());
    assert!(first.get("dueDate").is_some());
    assert!(first.get("createdAt").is_some());
    let statuses: Vec<&str> = tasks
        .as_array()
        .unwrap()
        .iter()
        .map(|task| task["status"].as_str().unwrap())
        .collect();
    assert!(statuses.contains(&"in-progress"));
}

#[test]
fn open_from_config_uses_local_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = CoreConfig {
        storage: StorageMode::Local,
        db_path: dir.path().join("configured.sqlite3"),
        ..CoreConfig::default()
    };

    let mut store = DomainStore::open(&config, clock()).unwrap();
    store.toggle_theme();
    store.close().unwrap();

    let reopened = DomainStore::open(&config, clock()).unwrap();
    assert_eq!(reopened.theme(), Theme::Dark);
}
