//! Persistence boundary of the domain store.
//!
//! # Responsibility
//! - Define the data-access contract the store uses for durable writes and
//!   change notifications (`PersistenceAdapter`).
//! - Provide the SQLite implementation of that contract and the keyed local
//!   snapshot used when no adapter is configured.
//!
//! # Invariants
//! - Translation between storage column names and domain field names happens
//!   inside adapters only; the store never sees storage names.
//! - Adapter failures surface as `AdapterError` values, never panics.

pub mod snapshot;
pub mod sqlite_adapter;

use crate::db::DbError;
use crate::model::notification::Notification;
use crate::model::task::{Comment, Task, TaskId};
use crate::model::user::User;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::mpsc::Receiver;
use uuid::Uuid;

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Entity collections known to the persistence boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Task,
    Comment,
    Notification,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::User,
        EntityKind::Task,
        EntityKind::Comment,
        EntityKind::Notification,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Task => "task",
            Self::Comment => "comment",
            Self::Notification => "notification",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A comment together with the task that owns it.
///
/// Comments have no identity outside their task, so they cross the
/// persistence boundary with the parent id attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRecord {
    pub task_id: TaskId,
    pub comment: Comment,
}

/// One record exchanged with an adapter.
///
/// `Entity::Task` carries its comment list for convenience, but adapters
/// persist comments only through `Entity::Comment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    User(User),
    Task(Task),
    Comment(CommentRecord),
    Notification(Notification),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::User(_) => EntityKind::User,
            Self::Task(_) => EntityKind::Task,
            Self::Comment(_) => EntityKind::Comment,
            Self::Notification(_) => EntityKind::Notification,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::User(user) => user.id,
            Self::Task(task) => task.id,
            Self::Comment(record) => record.comment.id,
            Self::Notification(notification) => notification.id,
        }
    }
}

/// Change pushed by an adapter to its subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Inserted(Entity),
    Updated(Entity),
    Deleted { kind: EntityKind, id: Uuid },
}

impl ChangeEvent {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Inserted(entity) | Self::Updated(entity) => entity.kind(),
            Self::Deleted { kind, .. } => *kind,
        }
    }
}

/// Adapter-level failure.
#[derive(Debug)]
pub enum AdapterError {
    Db(DbError),
    /// Target record does not exist in the backing store.
    NotFound { kind: EntityKind, id: Uuid },
    /// Stored data cannot be mapped back to a domain entity.
    InvalidData(String),
    /// Backing store cannot be reached or its handle is unusable.
    Unavailable(String),
}

impl Display for AdapterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { kind, id } => write!(f, "{kind} not found in storage: {id}"),
            Self::InvalidData(message) => write!(f, "invalid stored data: {message}"),
            Self::Unavailable(message) => write!(f, "storage unavailable: {message}"),
        }
    }
}

impl Error for AdapterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for AdapterError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for AdapterError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Data-access contract consumed by the domain store.
///
/// Implementations own field-name translation to their storage schema and
/// deliver change events for every successful write to subscribers of the
/// matching kind.
pub trait PersistenceAdapter: Send + Sync {
    /// Returns every stored record of `kind` in creation order.
    fn list(&self, kind: EntityKind) -> AdapterResult<Vec<Entity>>;
    /// Stores a new record and returns the authoritative stored version.
    fn insert(&self, entity: &Entity) -> AdapterResult<Entity>;
    /// Overwrites the mutable fields of an existing record.
    fn update(&self, entity: &Entity) -> AdapterResult<()>;
    fn remove(&self, kind: EntityKind, id: Uuid) -> AdapterResult<()>;
    /// Opens a change feed for `kind`. Dropping the receiver unsubscribes.
    fn subscribe(&self, kind: EntityKind) -> AdapterResult<Receiver<ChangeEvent>>;
}
