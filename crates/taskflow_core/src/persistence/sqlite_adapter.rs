//! SQLite implementation of the persistence adapter contract.
//!
//! # Responsibility
//! - Map domain entities to the relational storage schema and back.
//! - Publish a change event after every successful write.
//!
//! # Invariants
//! - Storage columns use snake_case names (`assignee_id`, `creator_id`,
//!   `due_date`, `is_read`, ...); domain names never leak into SQL.
//! - Read paths reject rows that cannot be mapped instead of masking them.
//! - Update/remove of an unknown id returns `AdapterError::NotFound`.

use crate::db::{open_db, open_db_in_memory};
use crate::model::notification::{Audience, Notification, NotificationKind};
use crate::model::task::{Comment, Task, TaskPriority, TaskStatus};
use crate::model::user::{Role, User};
use crate::persistence::{
    AdapterError, AdapterResult, ChangeEvent, CommentRecord, Entity, EntityKind,
    PersistenceAdapter,
};
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const DUE_DATE_FORMAT: &str = "%Y-%m-%d";

const USER_SELECT_SQL: &str =
    "SELECT id, name, email, password, role, phone, department, avatar_url FROM users";
const TASK_SELECT_SQL: &str = "SELECT
    id,
    title,
    description,
    status,
    priority,
    assignee_id,
    creator_id,
    due_date,
    created_at
FROM tasks";
const COMMENT_SELECT_SQL: &str =
    "SELECT id, task_id, author_id, body, created_at, edited_at FROM comments";
const NOTIFICATION_SELECT_SQL: &str =
    "SELECT id, kind, message, user_id, task_id, created_at, is_read FROM notifications";

struct Subscriber {
    kind: EntityKind,
    sender: Sender<ChangeEvent>,
}

/// Durable adapter over one migrated SQLite connection.
///
/// The connection sits behind a mutex so one adapter can be shared by several
/// store instances through `Arc`; each of them sees the others' writes via
/// `subscribe`.
pub struct SqliteAdapter {
    conn: Mutex<Connection>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl SqliteAdapter {
    /// Wraps an already-migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> AdapterResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> AdapterResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    fn conn(&self) -> AdapterResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AdapterError::Unavailable("sqlite connection lock poisoned".to_string()))
    }

    fn publish(&self, event: ChangeEvent) {
        let kind = event.kind();
        let Ok(mut subscribers) = self.subscribers.lock() else {
            warn!("event=change_publish module=persistence status=error kind={kind} error_code=lock_poisoned");
            return;
        };
        // Receivers that were dropped are pruned here.
        subscribers.retain(|subscriber| {
            subscriber.kind != kind || subscriber.sender.send(event.clone()).is_ok()
        });
        debug!(
            "event=change_publish module=persistence status=ok kind={kind} subscribers={}",
            subscribers.iter().filter(|s| s.kind == kind).count()
        );
    }

    fn fetch(&self, conn: &Connection, kind: EntityKind, id: Uuid) -> AdapterResult<Entity> {
        let id_text = id.to_string();
        let entity = match kind {
            EntityKind::User => conn
                .query_row(
                    &format!("{USER_SELECT_SQL} WHERE id = ?1"),
                    [&id_text],
                    |row| Ok(parse_user_row(row)),
                )
                .optional()?
                .transpose()?
                .map(Entity::User),
            EntityKind::Task => conn
                .query_row(
                    &format!("{TASK_SELECT_SQL} WHERE id = ?1"),
                    [&id_text],
                    |row| Ok(parse_task_row(row)),
                )
                .optional()?
                .transpose()?
                .map(Entity::Task),
            EntityKind::Comment => conn
                .query_row(
                    &format!("{COMMENT_SELECT_SQL} WHERE id = ?1"),
                    [&id_text],
                    |row| Ok(parse_comment_row(row)),
                )
                .optional()?
                .transpose()?
                .map(Entity::Comment),
            EntityKind::Notification => conn
                .query_row(
                    &format!("{NOTIFICATION_SELECT_SQL} WHERE id = ?1"),
                    [&id_text],
                    |row| Ok(parse_notification_row(row)),
                )
                .optional()?
                .transpose()?
                .map(Entity::Notification),
        };
        entity.ok_or(AdapterError::NotFound { kind, id })
    }
}

impl PersistenceAdapter for SqliteAdapter {
    fn list(&self, kind: EntityKind) -> AdapterResult<Vec<Entity>> {
        let conn = self.conn()?;
        let sql = match kind {
            EntityKind::User => format!("{USER_SELECT_SQL} ORDER BY rowid ASC"),
            EntityKind::Task => format!("{TASK_SELECT_SQL} ORDER BY created_at ASC, rowid ASC"),
            EntityKind::Comment => {
                format!("{COMMENT_SELECT_SQL} ORDER BY created_at ASC, rowid ASC")
            }
            EntityKind::Notification => {
                format!("{NOTIFICATION_SELECT_SQL} ORDER BY created_at ASC, rowid ASC")
            }
        };

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next()? {
            let entity = match kind {
                EntityKind::User => Entity::User(parse_user_row(row)?),
                EntityKind::Task => Entity::Task(parse_task_row(row)?),
                EntityKind::Comment => Entity::Comment(parse_comment_row(row)?),
                EntityKind::Notification => Entity::Notification(parse_notification_row(row)?),
            };
            entities.push(entity);
        }
        Ok(entities)
    }

    fn insert(&self, entity: &Entity) -> AdapterResult<Entity> {
        let stored = {
            let conn = self.conn()?;
            match entity {
                Entity::User(user) => {
                    conn.execute(
                        "INSERT INTO users (
                            id, name, email, password, role, phone, department, avatar_url
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
                        params![
                            user.id.to_string(),
                            user.name.as_str(),
                            user.email.as_str(),
                            user.password.as_str(),
                            user.role.as_str(),
                            user.phone.as_deref(),
                            user.department.as_deref(),
                            user.avatar.as_deref(),
                        ],
                    )?;
                }
                Entity::Task(task) => {
                    conn.execute(
                        "INSERT INTO tasks (
                            id, title, description, status, priority,
                            assignee_id, creator_id, due_date, created_at
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
                        params![
                            task.id.to_string(),
                            task.title.as_str(),
                            task.description.as_deref(),
                            task.status.as_str(),
                            task.priority.as_str(),
                            task.assignee_id.to_string(),
                            task.created_by.to_string(),
                            task.due_date.format(DUE_DATE_FORMAT).to_string(),
                            task.created_at.timestamp_millis(),
                        ],
                    )?;
                }
                Entity::Comment(record) => {
                    let comment = &record.comment;
                    conn.execute(
                        "INSERT INTO comments (
                            id, task_id, author_id, body, created_at, edited_at
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                        params![
                            comment.id.to_string(),
                            record.task_id.to_string(),
                            comment.author_id.to_string(),
                            comment.text.as_str(),
                            comment.created_at.timestamp_millis(),
                            comment.edited_at.map(|at| at.timestamp_millis()),
                        ],
                    )?;
                }
                Entity::Notification(notification) => {
                    conn.execute(
                        "INSERT INTO notifications (
                            id, kind, message, user_id, task_id, created_at, is_read
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                        params![
                            notification.id.to_string(),
                            notification.kind.as_str(),
                            notification.message.as_str(),
                            notification.audience.user_id().map(|id| id.to_string()),
                            notification.task_id.map(|id| id.to_string()),
                            notification.created_at.timestamp_millis(),
                            bool_to_int(notification.read),
                        ],
                    )?;
                }
            }
            self.fetch(&conn, entity.kind(), entity.id())?
        };

        self.publish(ChangeEvent::Inserted(stored.clone()));
        Ok(stored)
    }

    fn update(&self, entity: &Entity) -> AdapterResult<()> {
        let stored = {
            let conn = self.conn()?;
            let changed = match entity {
                Entity::User(user) => conn.execute(
                    "UPDATE users
                     SET
                        name = ?1,
                        email = ?2,
                        password = ?3,
                        role = ?4,
                        phone = ?5,
                        department = ?6,
                        avatar_url = ?7
                     WHERE id = ?8;",
                    params![
                        user.name.as_str(),
                        user.email.as_str(),
                        user.password.as_str(),
                        user.role.as_str(),
                        user.phone.as_deref(),
                        user.department.as_deref(),
                        user.avatar.as_deref(),
                        user.id.to_string(),
                    ],
                )?,
                Entity::Task(task) => conn.execute(
                    "UPDATE tasks
                     SET
                        title = ?1,
                        description = ?2,
                        status = ?3,
                        priority = ?4,
                        assignee_id = ?5,
                        due_date = ?6
                     WHERE id = ?7;",
                    params![
                        task.title.as_str(),
                        task.description.as_deref(),
                        task.status.as_str(),
                        task.priority.as_str(),
                        task.assignee_id.to_string(),
                        task.due_date.format(DUE_DATE_FORMAT).to_string(),
                        task.id.to_string(),
                    ],
                )?,
                Entity::Comment(record) => conn.execute(
                    "UPDATE comments SET body = ?1, edited_at = ?2 WHERE id = ?3 AND task_id = ?4;",
                    params![
                        record.comment.text.as_str(),
                        record.comment.edited_at.map(|at| at.timestamp_millis()),
                        record.comment.id.to_string(),
                        record.task_id.to_string(),
                    ],
                )?,
                Entity::Notification(notification) => conn.execute(
                    "UPDATE notifications SET is_read = ?1 WHERE id = ?2;",
                    params![
                        bool_to_int(notification.read),
                        notification.id.to_string()
                    ],
                )?,
            };

            if changed == 0 {
                return Err(AdapterError::NotFound {
                    kind: entity.kind(),
                    id: entity.id(),
                });
            }
            self.fetch(&conn, entity.kind(), entity.id())?
        };

        self.publish(ChangeEvent::Updated(stored));
        Ok(())
    }

    fn remove(&self, kind: EntityKind, id: Uuid) -> AdapterResult<()> {
        {
            let conn = self.conn()?;
            let table = match kind {
                EntityKind::User => "users",
                EntityKind::Task => "tasks",
                EntityKind::Comment => "comments",
                EntityKind::Notification => "notifications",
            };
            let changed = conn.execute(
                &format!("DELETE FROM {table} WHERE id = ?1;"),
                [id.to_string()],
            )?;
            if changed == 0 {
                return Err(AdapterError::NotFound { kind, id });
            }
        }

        self.publish(ChangeEvent::Deleted { kind, id });
        Ok(())
    }

    fn subscribe(&self, kind: EntityKind) -> AdapterResult<Receiver<ChangeEvent>> {
        let (sender, receiver) = channel();
        self.subscribers
            .lock()
            .map_err(|_| AdapterError::Unavailable("subscriber list lock poisoned".to_string()))?
            .push(Subscriber { kind, sender });
        Ok(receiver)
    }
}

fn parse_user_row(row: &Row<'_>) -> AdapterResult<User> {
    let role_text: String = row.get("role")?;
    let role = Role::parse(&role_text)
        .ok_or_else(|| AdapterError::InvalidData(format!("invalid role `{role_text}` in users.role")))?;

    Ok(User {
        id: parse_uuid(row, "id", "users.id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        password: row.get("password")?,
        role,
        phone: row.get("phone")?,
        department: row.get("department")?,
        avatar: row.get("avatar_url")?,
    })
}

fn parse_task_row(row: &Row<'_>) -> AdapterResult<Task> {
    let status_text: String = row.get("status")?;
    let status = TaskStatus::parse(&status_text).ok_or_else(|| {
        AdapterError::InvalidData(format!("invalid task status `{status_text}` in tasks.status"))
    })?;

    let priority_text: String = row.get("priority")?;
    let priority = TaskPriority::parse(&priority_text).ok_or_else(|| {
        AdapterError::InvalidData(format!(
            "invalid task priority `{priority_text}` in tasks.priority"
        ))
    })?;

    let due_text: String = row.get("due_date")?;
    let due_date = NaiveDate::parse_from_str(&due_text, DUE_DATE_FORMAT).map_err(|_| {
        AdapterError::InvalidData(format!("invalid due date `{due_text}` in tasks.due_date"))
    })?;

    Ok(Task {
        id: parse_uuid(row, "id", "tasks.id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status,
        priority,
        assignee_id: parse_uuid(row, "assignee_id", "tasks.assignee_id")?,
        created_by: parse_uuid(row, "creator_id", "tasks.creator_id")?,
        due_date,
        created_at: parse_millis(row.get("created_at")?, "tasks.created_at")?,
        comments: Vec::new(),
    })
}

fn parse_comment_row(row: &Row<'_>) -> AdapterResult<CommentRecord> {
    let edited_at = match row.get::<_, Option<i64>>("edited_at")? {
        Some(millis) => Some(parse_millis(millis, "comments.edited_at")?),
        None => None,
    };

    Ok(CommentRecord {
        task_id: parse_uuid(row, "task_id", "comments.task_id")?,
        comment: Comment {
            id: parse_uuid(row, "id", "comments.id")?,
            text: row.get("body")?,
            author_id: parse_uuid(row, "author_id", "comments.author_id")?,
            created_at: parse_millis(row.get("created_at")?, "comments.created_at")?,
            edited_at,
        },
    })
}

fn parse_notification_row(row: &Row<'_>) -> AdapterResult<Notification> {
    let kind_text: String = row.get("kind")?;
    let kind = NotificationKind::parse(&kind_text).ok_or_else(|| {
        AdapterError::InvalidData(format!("invalid kind `{kind_text}` in notifications.kind"))
    })?;

    let audience = match parse_optional_uuid(row, "user_id", "notifications.user_id")? {
        Some(user_id) => Audience::User(user_id),
        None => Audience::Broadcast,
    };

    let read = match row.get::<_, i64>("is_read")? {
        0 => false,
        1 => true,
        other => {
            return Err(AdapterError::InvalidData(format!(
                "invalid is_read value `{other}` in notifications.is_read"
            )));
        }
    };

    Ok(Notification {
        id: parse_uuid(row, "id", "notifications.id")?,
        kind,
        message: row.get("message")?,
        audience,
        task_id: parse_optional_uuid(row, "task_id", "notifications.task_id")?,
        created_at: parse_millis(row.get("created_at")?, "notifications.created_at")?,
        read,
    })
}

fn parse_uuid(row: &Row<'_>, column: &str, label: &str) -> AdapterResult<Uuid> {
    let text: String = row.get(column)?;
    Uuid::parse_str(&text)
        .map_err(|_| AdapterError::InvalidData(format!("invalid uuid value `{text}` in {label}")))
}

fn parse_optional_uuid(row: &Row<'_>, column: &str, label: &str) -> AdapterResult<Option<Uuid>> {
    match row.get::<_, Option<String>>(column)? {
        Some(text) => Uuid::parse_str(&text).map(Some).map_err(|_| {
            AdapterError::InvalidData(format!("invalid uuid value `{text}` in {label}"))
        }),
        None => Ok(None),
    }
}

fn parse_millis(millis: i64, label: &str) -> AdapterResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| AdapterError::InvalidData(format!("invalid timestamp `{millis}` in {label}")))
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteAdapter;
    use crate::model::user::{Role, User};
    use crate::persistence::{AdapterError, ChangeEvent, Entity, EntityKind, PersistenceAdapter};

    #[test]
    fn insert_publishes_to_matching_subscribers_only() {
        let adapter = SqliteAdapter::open_in_memory().expect("adapter should open");
        let users = adapter.subscribe(EntityKind::User).expect("subscribe users");
        let tasks = adapter.subscribe(EntityKind::Task).expect("subscribe tasks");

        let user = User::new("Ada", "ada@example.com", "pw", Role::Admin);
        adapter
            .insert(&Entity::User(user.clone()))
            .expect("insert should succeed");

        match users.try_recv().expect("user event expected") {
            ChangeEvent::Inserted(Entity::User(stored)) => assert_eq!(stored, user),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(tasks.try_recv().is_err());
    }

    #[test]
    fn dropped_receivers_do_not_break_publishing() {
        let adapter = SqliteAdapter::open_in_memory().expect("adapter should open");
        drop(adapter.subscribe(EntityKind::User).expect("subscribe"));

        let user = User::new("Ada", "ada@example.com", "pw", Role::Admin);
        adapter
            .insert(&Entity::User(user))
            .expect("insert should succeed without live subscribers");
    }

    #[test]
    fn remove_unknown_id_is_not_found() {
        let adapter = SqliteAdapter::open_in_memory().expect("adapter should open");
        let id = uuid::Uuid::new_v4();
        let err = adapter
            .remove(EntityKind::Task, id)
            .expect_err("missing task should fail");
        assert!(matches!(err, AdapterError::NotFound { kind: EntityKind::Task, id: missing } if missing == id));
    }
}
