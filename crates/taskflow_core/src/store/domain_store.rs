//! `DomainStore` context object.
//!
//! # Responsibility
//! - Own users, tasks, notifications, the session and the theme preference.
//! - Validate and apply every mutation, appending the notification it causes
//!   before returning.
//! - Drive the durable phase (`flush`) against a local snapshot or a
//!   persistence adapter, and fold remote change events back in.
//!
//! # Invariants
//! - Timestamps are truncated to whole milliseconds so local and stored
//!   records compare equal.
//! - User-provided text is never written to logs.

use super::error::{AuthError, StoreError, StoreResult};
use super::pending::{FlushReport, PendingChange, PendingOp, PendingQueue, RolledBackChange};
use crate::clock::Clock;
use crate::config::{CoreConfig, StorageMode};
use crate::model::notification::{
    Audience, NewNotification, Notification, NotificationId, NotificationKind,
};
use crate::model::task::{Comment, CommentId, NewComment, NewTask, Task, TaskId, TaskPatch};
use crate::model::theme::Theme;
use crate::model::user::{is_valid_email, User, UserId, UserPatch};
use crate::model::validation::ValidationError;
use crate::persistence::snapshot::{LocalSnapshot, SnapshotKey, SnapshotWrite};
use crate::persistence::sqlite_adapter::SqliteAdapter;
use crate::persistence::{
    AdapterResult, ChangeEvent, CommentRecord, Entity, EntityKind, PersistenceAdapter,
};
use crate::seed;
use crate::session::Session;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use uuid::Uuid;

/// Plain-data image of a store, used for construction and export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreState {
    pub users: Vec<User>,
    pub tasks: Vec<Task>,
    pub notifications: Vec<Notification>,
    pub current_user: Option<User>,
    pub theme: Theme,
}

/// Borrowed read-only view over the store collections.
#[derive(Debug, Clone, Copy)]
pub struct StoreSnapshot<'a> {
    pub users: &'a [User],
    pub tasks: &'a [Task],
    pub notifications: &'a [Notification],
}

impl<'a> StoreSnapshot<'a> {
    pub fn user(&self, id: UserId) -> Option<&'a User> {
        self.users.iter().find(|user| user.id == id)
    }

    pub fn task(&self, id: TaskId) -> Option<&'a Task> {
        self.tasks.iter().find(|task| task.id == id)
    }
}

enum Backend {
    /// Nothing is persisted; `flush` is a no-op.
    Memory,
    Local(LocalSnapshot),
    Remote {
        adapter: Arc<dyn PersistenceAdapter>,
        feeds: Vec<Receiver<ChangeEvent>>,
    },
}

impl Backend {
    fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Local(_) => "local",
            Self::Remote { .. } => "remote",
        }
    }
}

/// Result of pushing one pending change to an adapter.
enum Sent {
    /// Adapter returned its authoritative copy.
    Stored(Entity),
    Done,
    /// Entity no longer exists locally; nothing to send.
    Skipped,
}

/// Single owner of the domain state.
pub struct DomainStore {
    users: Vec<User>,
    tasks: Vec<Task>,
    notifications: Vec<Notification>,
    session: Session,
    theme: Theme,
    clock: Arc<dyn Clock>,
    backend: Backend,
    pending: PendingQueue,
}

impl DomainStore {
    /// In-memory store over `state`. Nothing is persisted.
    pub fn new(state: StoreState, clock: Arc<dyn Clock>) -> Self {
        Self::with_backend(state, clock, Backend::Memory)
    }

    /// Loads the keyed local snapshot, falling back to the seed dataset for
    /// missing collections.
    ///
    /// # Errors
    /// - Returns `StoreError::Snapshot` when a present key cannot be read or
    ///   decoded.
    pub fn open_local(snapshot: LocalSnapshot, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let now = truncate_to_millis(clock.now());

        let users: Option<Vec<User>> = snapshot.load(SnapshotKey::Users)?;
        let tasks: Option<Vec<Task>> = snapshot.load(SnapshotKey::Tasks)?;
        let notifications: Option<Vec<Notification>> =
            snapshot.load(SnapshotKey::Notifications)?;
        let current_user: Option<User> = snapshot.load(SnapshotKey::CurrentUser)?;
        let theme: Option<Theme> = snapshot.load(SnapshotKey::Theme)?;

        let seeded_users = users.is_none();
        let users = users.unwrap_or_else(seed::seed_users);
        let tasks = tasks.unwrap_or_else(|| seed::seed_tasks(&users, now));
        let notifications = notifications.unwrap_or_else(|| seed::seed_notifications(now));

        let state = StoreState {
            users,
            tasks,
            notifications,
            current_user,
            theme: theme.unwrap_or_default(),
        };
        let store = Self::with_backend(state, clock, Backend::Local(snapshot));
        info!(
            "event=store_open module=store status=ok backend=local users={} tasks={} notifications={} seeded_users={}",
            store.users.len(),
            store.tasks.len(),
            store.notifications.len(),
            seeded_users
        );
        Ok(store)
    }

    /// Subscribes to every entity kind, then loads the adapter's current
    /// records. The session starts signed out.
    ///
    /// # Errors
    /// - Returns `StoreError::Persistence` when subscribing or listing fails.
    pub fn connect(adapter: Arc<dyn PersistenceAdapter>, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let feeds = EntityKind::ALL
            .iter()
            .map(|kind| adapter.subscribe(*kind))
            .collect::<AdapterResult<Vec<_>>>()?;

        let mut state = StoreState::default();
        for entity in adapter.list(EntityKind::User)? {
            if let Entity::User(user) = entity {
                state.users.push(user);
            }
        }
        for entity in adapter.list(EntityKind::Task)? {
            if let Entity::Task(task) = entity {
                state.tasks.push(task);
            }
        }
        for entity in adapter.list(EntityKind::Comment)? {
            let Entity::Comment(record) = entity else {
                continue;
            };
            match state.tasks.iter_mut().find(|task| task.id == record.task_id) {
                Some(task) => task.comments.push(record.comment),
                None => warn!(
                    "event=store_open module=store status=orphan_comment comment_id={} task_id={}",
                    record.comment.id, record.task_id
                ),
            }
        }
        for entity in adapter.list(EntityKind::Notification)? {
            if let Entity::Notification(notification) = entity {
                state.notifications.push(notification);
            }
        }

        let store = Self::with_backend(state, clock, Backend::Remote { adapter, feeds });
        info!(
            "event=store_open module=store status=ok backend=remote users={} tasks={} notifications={}",
            store.users.len(),
            store.tasks.len(),
            store.notifications.len()
        );
        Ok(store)
    }

    /// Opens the backend selected by `config`.
    ///
    /// An empty SQLite database receives the seed dataset before returning.
    pub fn open(config: &CoreConfig, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        match config.storage {
            StorageMode::Local => {
                let snapshot = LocalSnapshot::open(&config.db_path)?;
                Self::open_local(snapshot, clock)
            }
            StorageMode::Sqlite => {
                let adapter = Arc::new(SqliteAdapter::open(&config.db_path)?);
                let mut store = Self::connect(adapter, clock)?;
                if store.users.is_empty() {
                    store.install_seed()?;
                }
                Ok(store)
            }
        }
    }

    fn with_backend(state: StoreState, clock: Arc<dyn Clock>, backend: Backend) -> Self {
        let StoreState {
            users,
            tasks,
            notifications,
            current_user,
            theme,
        } = state;

        // Principal must still exist; take the fresh record when it does.
        let principal = current_user
            .and_then(|current| users.iter().find(|user| user.id == current.id).cloned());
        let session = match principal {
            Some(user) => Session::with_principal(user),
            None => Session::new(),
        };

        Self {
            users,
            tasks,
            notifications,
            session,
            theme,
            clock,
            backend,
            pending: PendingQueue::default(),
        }
    }

    fn install_seed(&mut self) -> StoreResult<FlushReport> {
        let state = seed::seed_state(self.now());
        for user in state.users {
            self.record(EntityKind::User, user.id, PendingOp::Insert);
            self.users.push(user);
        }
        for task in state.tasks {
            self.record(EntityKind::Task, task.id, PendingOp::Insert);
            for comment in &task.comments {
                self.record(EntityKind::Comment, comment.id, PendingOp::Insert);
            }
            self.tasks.push(task);
        }
        for notification in state.notifications {
            self.record(EntityKind::Notification, notification.id, PendingOp::Insert);
            self.notifications.push(notification);
        }

        let report = self.flush()?;
        info!(
            "event=store_seed module=store status=ok confirmed={} rolled_back={}",
            report.confirmed,
            report.rolled_back.len()
        );
        Ok(report)
    }

    // ---- queries ----

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// All notifications in creation order, regardless of audience.
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn user(&self, id: UserId) -> Option<&User> {
        self.users.iter().find(|user| user.id == id)
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn notification(&self, id: NotificationId) -> Option<&Notification> {
        self.notifications
            .iter()
            .find(|notification| notification.id == id)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn snapshot(&self) -> StoreSnapshot<'_> {
        StoreSnapshot {
            users: &self.users,
            tasks: &self.tasks,
            notifications: &self.notifications,
        }
    }

    /// Owned copy of the full state.
    pub fn state(&self) -> StoreState {
        StoreState {
            users: self.users.clone(),
            tasks: self.tasks.clone(),
            notifications: self.notifications.clone(),
            current_user: self.session.principal().cloned(),
            theme: self.theme,
        }
    }

    /// True while a local change to `id` awaits confirmation.
    pub fn is_pending(&self, id: Uuid) -> bool {
        self.pending.contains(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    // ---- tasks ----

    /// Creates a task and broadcasts a success notification for it.
    ///
    /// # Errors
    /// - `Validation` for a blank title, a missing or unknown assignee, an
    ///   unknown creator, or a due date that is not after today.
    pub fn create_task(&mut self, input: NewTask) -> StoreResult<Task> {
        if input.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle.into());
        }
        let assignee_id = input.assignee_id.ok_or(ValidationError::MissingAssignee)?;
        let assignee_name = self
            .user(assignee_id)
            .map(|user| user.name.clone())
            .ok_or(ValidationError::AssigneeNotFound(assignee_id))?;
        if self.user(input.created_by).is_none() {
            return Err(ValidationError::CreatorNotFound(input.created_by).into());
        }

        let now = self.now();
        let today = now.date_naive();
        if input.due_date <= today {
            return Err(ValidationError::DueDateNotInFuture {
                due_date: input.due_date,
                today,
            }
            .into());
        }

        let task = Task {
            id: Uuid::new_v4(),
            title: input.title,
            description: input.description,
            status: input.status,
            priority: input.priority,
            assignee_id,
            created_by: input.created_by,
            due_date: input.due_date,
            created_at: now,
            comments: Vec::new(),
        };
        let message = format!(
            "New task \"{}\" created and assigned to {}",
            task.title, assignee_name
        );

        self.tasks.push(task.clone());
        self.record(EntityKind::Task, task.id, PendingOp::Insert);
        self.push_notification(
            NewNotification::broadcast(NotificationKind::Success, message).for_task(task.id),
        );

        info!(
            "event=task_create module=store status=ok task_id={} status_value={} priority={}",
            task.id,
            task.status.as_str(),
            task.priority.as_str()
        );
        Ok(task)
    }

    /// Merges `patch` into an existing task.
    ///
    /// Title and due date are not re-validated. A changed assignee must
    /// reference an existing user.
    pub fn update_task(&mut self, id: TaskId, patch: &TaskPatch) -> StoreResult<Task> {
        let index = self.task_index(id)?;
        if let Some(assignee_id) = patch.assignee_id {
            if self.user(assignee_id).is_none() {
                return Err(ValidationError::AssigneeNotFound(assignee_id).into());
            }
        }

        let previous = self.tasks[index].clone();
        patch.apply_to(&mut self.tasks[index]);
        let updated = self.tasks[index].clone();

        let message = format!("Task \"{}\" has been updated", previous.title);
        self.record(
            EntityKind::Task,
            id,
            PendingOp::Update {
                previous: Entity::Task(previous),
            },
        );
        self.push_notification(
            NewNotification::broadcast(NotificationKind::Info, message).for_task(id),
        );

        info!(
            "event=task_update module=store status=ok task_id={} status_value={}",
            id,
            updated.status.as_str()
        );
        Ok(updated)
    }

    /// Removes a task together with its comments.
    pub fn delete_task(&mut self, id: TaskId) -> StoreResult<Task> {
        let index = self.task_index(id)?;
        let removed = self.tasks.remove(index);

        self.record(
            EntityKind::Task,
            id,
            PendingOp::Remove {
                previous: Entity::Task(removed.clone()),
                position: index,
            },
        );
        self.push_notification(NewNotification::broadcast(
            NotificationKind::Warning,
            format!("Task \"{}\" has been deleted", removed.title),
        ));

        info!(
            "event=task_delete module=store status=ok task_id={} comments={}",
            id,
            removed.comments.len()
        );
        Ok(removed)
    }

    // ---- comments ----

    pub fn add_comment(&mut self, task_id: TaskId, input: NewComment) -> StoreResult<Comment> {
        let index = self.task_index(task_id)?;
        if input.text.trim().is_empty() {
            return Err(ValidationError::EmptyCommentText.into());
        }
        if self.user(input.author_id).is_none() {
            return Err(ValidationError::AuthorNotFound(input.author_id).into());
        }

        let comment = Comment {
            id: Uuid::new_v4(),
            text: input.text,
            author_id: input.author_id,
            created_at: self.now(),
            edited_at: None,
        };
        self.tasks[index].comments.push(comment.clone());
        self.record(EntityKind::Comment, comment.id, PendingOp::Insert);

        info!(
            "event=comment_add module=store status=ok task_id={} comment_id={}",
            task_id, comment.id
        );
        Ok(comment)
    }

    /// Replaces the text of a comment and stamps `edited_at`.
    ///
    /// `edited_at` is always strictly later than `created_at`.
    pub fn update_comment(
        &mut self,
        task_id: TaskId,
        comment_id: CommentId,
        text: impl Into<String>,
    ) -> StoreResult<Comment> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyCommentText.into());
        }
        let index = self.task_index(task_id)?;
        let now = self.now();

        let comment = self.tasks[index]
            .comment_mut(comment_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Comment, comment_id))?;
        let previous = CommentRecord {
            task_id,
            comment: comment.clone(),
        };
        let floor = comment.created_at + Duration::milliseconds(1);
        comment.text = text;
        comment.edited_at = Some(now.max(floor));
        let updated = comment.clone();

        self.record(
            EntityKind::Comment,
            comment_id,
            PendingOp::Update {
                previous: Entity::Comment(previous),
            },
        );

        info!(
            "event=comment_update module=store status=ok task_id={} comment_id={}",
            task_id, comment_id
        );
        Ok(updated)
    }

    // ---- session ----

    /// Signs in the user whose email and password match exactly.
    pub fn login(&mut self, email: &str, password: &str) -> StoreResult<User> {
        let Some(user) = self
            .users
            .iter()
            .find(|user| user.matches_credentials(email, password))
            .cloned()
        else {
            warn!("event=login module=store status=denied");
            return Err(AuthError::InvalidCredentials.into());
        };

        self.session.sign_in(user.clone());
        self.push_notification(NewNotification::addressed(
            NotificationKind::Info,
            user.id,
            format!("Welcome back, {}!", user.name),
        ));

        info!("event=login module=store status=ok user_id={}", user.id);
        Ok(user)
    }

    pub fn logout(&mut self) -> StoreResult<User> {
        let user = self
            .session
            .sign_out()
            .ok_or(AuthError::NotAuthenticated)?;

        self.push_notification(NewNotification::broadcast(
            NotificationKind::Info,
            format!("{} has logged out", user.name),
        ));

        info!("event=logout module=store status=ok user_id={}", user.id);
        Ok(user)
    }

    // ---- users ----

    /// Merges `patch` into a user profile.
    ///
    /// When the user is the signed-in principal, the session sees the new
    /// record before this returns.
    pub fn update_user(&mut self, id: UserId, patch: &UserPatch) -> StoreResult<User> {
        let index = self.user_index(id)?;
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(ValidationError::EmptyUserName.into());
            }
        }
        if let Some(email) = &patch.email {
            self.check_email(email, Some(id))?;
        }

        let previous = self.users[index].clone();
        patch.apply_to(&mut self.users[index]);
        let updated = self.users[index].clone();
        self.session.refresh(&updated);

        self.record(
            EntityKind::User,
            id,
            PendingOp::Update {
                previous: Entity::User(previous),
            },
        );
        self.push_notification(NewNotification::addressed(
            NotificationKind::Info,
            id,
            "User profile has been updated",
        ));

        info!("event=user_update module=store status=ok user_id={}", id);
        Ok(updated)
    }

    /// Adds a user record without emitting a notification.
    pub fn import_user(&mut self, user: User) -> StoreResult<UserId> {
        if user.name.trim().is_empty() {
            return Err(ValidationError::EmptyUserName.into());
        }
        if self.user_index(user.id).is_ok() {
            return Err(ValidationError::DuplicateUserId(user.id).into());
        }
        self.check_email(&user.email, None)?;

        let id = user.id;
        self.users.push(user);
        self.record(EntityKind::User, id, PendingOp::Insert);

        info!("event=user_import module=store status=ok user_id={}", id);
        Ok(id)
    }

    fn check_email(&self, email: &str, owner: Option<UserId>) -> StoreResult<()> {
        if !is_valid_email(email) {
            return Err(ValidationError::InvalidEmail(email.to_string()).into());
        }
        let taken = self
            .users
            .iter()
            .any(|user| Some(user.id) != owner && user.email == email);
        if taken {
            return Err(ValidationError::DuplicateEmail(email.to_string()).into());
        }
        Ok(())
    }

    // ---- notifications ----

    /// Appends a caller-built notification.
    pub fn add_notification(&mut self, input: NewNotification) -> StoreResult<Notification> {
        if input.message.trim().is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        Ok(self.push_notification(input))
    }

    /// Marks one notification read. Returns whether anything changed.
    pub fn mark_notification_read(&mut self, id: NotificationId) -> StoreResult<bool> {
        let index = self
            .notifications
            .iter()
            .position(|notification| notification.id == id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Notification, id))?;

        let previous = self.notifications[index].clone();
        if !self.notifications[index].mark_read() {
            return Ok(false);
        }
        self.record(
            EntityKind::Notification,
            id,
            PendingOp::Update {
                previous: Entity::Notification(previous),
            },
        );
        debug!(
            "event=notification_read module=store status=ok notification_id={}",
            id
        );
        Ok(true)
    }

    /// Marks every unread notification read and returns how many changed.
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = Vec::new();
        for notification in &mut self.notifications {
            let previous = notification.clone();
            if notification.mark_read() {
                changed.push(previous);
            }
        }

        let count = changed.len();
        for previous in changed {
            let id = previous.id;
            self.record(
                EntityKind::Notification,
                id,
                PendingOp::Update {
                    previous: Entity::Notification(previous),
                },
            );
        }
        info!(
            "event=notification_read_all module=store status=ok changed={}",
            count
        );
        count
    }

    // ---- preferences ----

    pub fn toggle_theme(&mut self) -> Theme {
        self.theme = self.theme.toggled();
        debug!(
            "event=theme_toggle module=store status=ok theme={:?}",
            self.theme
        );
        self.theme
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }

    // ---- durable phase ----

    /// Persists pending changes.
    ///
    /// Remote rejections are rolled back and reported in the returned
    /// `FlushReport`, not as an error.
    ///
    /// # Errors
    /// - Local backend: returns `StoreError::Snapshot` when the snapshot
    ///   transaction fails. Pending changes are kept for retry.
    pub fn flush(&mut self) -> StoreResult<FlushReport> {
        let adapter = match &self.backend {
            Backend::Memory => return Ok(FlushReport::default()),
            Backend::Local(_) => None,
            Backend::Remote { adapter, .. } => Some(Arc::clone(adapter)),
        };
        match adapter {
            Some(adapter) => Ok(self.flush_remote(adapter.as_ref())),
            None => self.flush_local(),
        }
    }

    /// Flushes and releases the backend.
    pub fn close(mut self) -> StoreResult<FlushReport> {
        let report = self.flush()?;
        info!(
            "event=store_close module=store status=ok backend={} confirmed={} rolled_back={}",
            self.backend.label(),
            report.confirmed,
            report.rolled_back.len()
        );
        Ok(report)
    }

    fn flush_local(&mut self) -> StoreResult<FlushReport> {
        let writes = self.snapshot_writes()?;
        let Backend::Local(snapshot) = &mut self.backend else {
            return Ok(FlushReport::default());
        };

        if let Err(err) = snapshot.write_batch(&writes) {
            warn!(
                "event=store_flush module=store status=error backend=local pending={} error={}",
                self.pending.len(),
                err
            );
            return Err(err.into());
        }

        let confirmed = self.pending.len();
        self.pending.clear();
        info!(
            "event=store_flush module=store status=ok backend=local confirmed={}",
            confirmed
        );
        Ok(FlushReport {
            confirmed,
            ..FlushReport::default()
        })
    }

    fn snapshot_writes(&self) -> StoreResult<Vec<SnapshotWrite>> {
        let current_user = match self.session.principal() {
            Some(user) => SnapshotWrite::put(SnapshotKey::CurrentUser, user)?,
            None => SnapshotWrite::Remove(SnapshotKey::CurrentUser),
        };
        Ok(vec![
            SnapshotWrite::put(SnapshotKey::Users, &self.users)?,
            SnapshotWrite::put(SnapshotKey::Tasks, &self.tasks)?,
            SnapshotWrite::put(SnapshotKey::Notifications, &self.notifications)?,
            current_user,
            SnapshotWrite::put(SnapshotKey::Theme, &self.theme)?,
        ])
    }

    fn flush_remote(&mut self, adapter: &dyn PersistenceAdapter) -> FlushReport {
        let mut report = FlushReport::default();
        let mut queue: VecDeque<PendingChange> = self.pending.take_all().into();

        while let Some(change) = queue.pop_front() {
            match self.send_change(adapter, &change) {
                Ok(Sent::Stored(entity)) => {
                    self.adopt(entity);
                    report.confirmed += 1;
                }
                Ok(Sent::Done) => report.confirmed += 1,
                Ok(Sent::Skipped) => debug!(
                    "event=store_flush module=store status=skipped kind={} id={}",
                    change.kind, change.id
                ),
                Err(err) if change.kind == EntityKind::Notification => {
                    warn!(
                        "event=notification_write module=store status=error notification_id={} error={}",
                        change.id, err
                    );
                    report.unsaved_notifications += 1;
                }
                Err(err) => {
                    warn!(
                        "event=store_flush module=store status=rolled_back kind={} id={} error={}",
                        change.kind, change.id, err
                    );
                    queue.retain(|later| later.id != change.id);
                    self.roll_back(&change);

                    let reason = err.to_string();
                    let mut notice = match self.session.principal_id() {
                        Some(user_id) => NewNotification::addressed(
                            NotificationKind::Warning,
                            user_id,
                            failure_message(change.kind, &reason),
                        ),
                        None => NewNotification::broadcast(
                            NotificationKind::Warning,
                            failure_message(change.kind, &reason),
                        ),
                    };
                    if change.kind == EntityKind::Task {
                        notice = notice.for_task(change.id);
                    }
                    self.push_notification(notice);

                    report.rolled_back.push(RolledBackChange {
                        kind: change.kind,
                        id: change.id,
                        reason,
                    });
                }
            }
        }

        info!(
            "event=store_flush module=store status=ok backend=remote confirmed={} rolled_back={} unsaved_notifications={}",
            report.confirmed,
            report.rolled_back.len(),
            report.unsaved_notifications
        );
        report
    }

    fn send_change(
        &self,
        adapter: &dyn PersistenceAdapter,
        change: &PendingChange,
    ) -> AdapterResult<Sent> {
        match &change.op {
            PendingOp::Insert => match self.entity(change.kind, change.id) {
                Some(entity) => adapter.insert(&entity).map(Sent::Stored),
                None => Ok(Sent::Skipped),
            },
            PendingOp::Update { .. } => match self.entity(change.kind, change.id) {
                Some(entity) => adapter.update(&entity).map(|()| Sent::Done),
                None => Ok(Sent::Skipped),
            },
            PendingOp::Remove { .. } => adapter
                .remove(change.kind, change.id)
                .map(|()| Sent::Done),
        }
    }

    fn roll_back(&mut self, change: &PendingChange) {
        match &change.op {
            PendingOp::Insert => {
                self.remove_entity(change.kind, change.id);
            }
            PendingOp::Update { previous } => self.adopt(previous.clone()),
            PendingOp::Remove { previous, position } => {
                self.insert_entity_at(previous.clone(), Some(*position));
            }
        }
    }

    // ---- remote reconciliation ----

    /// Applies change events received from the adapter since the last call.
    ///
    /// Returns the number of events that changed local state. Never emits
    /// notifications. Non-remote stores return 0.
    pub fn pull_remote_changes(&mut self) -> usize {
        let events: Vec<ChangeEvent> = match &self.backend {
            Backend::Remote { feeds, .. } => {
                feeds.iter().flat_map(|feed| feed.try_iter()).collect()
            }
            _ => return 0,
        };

        let received = events.len();
        let mut applied = 0;
        for event in events {
            if self.apply_remote(event) {
                applied += 1;
            }
        }

        if received > 0 {
            info!(
                "event=remote_pull module=store status=ok received={} applied={}",
                received, applied
            );
        }
        applied
    }

    fn apply_remote(&mut self, event: ChangeEvent) -> bool {
        match event {
            ChangeEvent::Inserted(entity) => {
                if self.contains(entity.kind(), entity.id()) {
                    return false;
                }
                self.insert_entity_at(entity, None)
            }
            ChangeEvent::Updated(entity) => {
                let (kind, id) = (entity.kind(), entity.id());
                if self.pending.rebase(id, entity.clone()) {
                    debug!(
                        "event=remote_pull module=store status=rebased kind={} id={}",
                        kind, id
                    );
                    return false;
                }
                if self.contains(kind, id) {
                    self.adopt(entity);
                    true
                } else {
                    self.insert_entity_at(entity, None)
                }
            }
            ChangeEvent::Deleted { kind, id } => {
                self.pending.discard(id);
                self.remove_entity(kind, id)
            }
        }
    }

    // ---- entity plumbing ----

    fn now(&self) -> DateTime<Utc> {
        truncate_to_millis(self.clock.now())
    }

    fn record(&mut self, kind: EntityKind, id: Uuid, op: PendingOp) {
        if matches!(self.backend, Backend::Memory) {
            return;
        }
        self.pending.record(kind, id, op);
    }

    fn push_notification(&mut self, input: NewNotification) -> Notification {
        let notification = Notification {
            id: Uuid::new_v4(),
            kind: input.kind,
            message: input.message,
            audience: input.audience,
            task_id: input.task_id,
            created_at: self.now(),
            read: false,
        };
        self.notifications.push(notification.clone());
        self.record(
            EntityKind::Notification,
            notification.id,
            PendingOp::Insert,
        );
        debug!(
            "event=notification_add module=store status=ok notification_id={} kind={} addressed={}",
            notification.id,
            notification.kind.as_str(),
            matches!(notification.audience, Audience::User(_))
        );
        notification
    }

    fn task_index(&self, id: TaskId) -> StoreResult<usize> {
        self.tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Task, id))
    }

    fn user_index(&self, id: UserId) -> StoreResult<usize> {
        self.users
            .iter()
            .position(|user| user.id == id)
            .ok_or_else(|| StoreError::not_found(EntityKind::User, id))
    }

    fn find_comment(&self, id: CommentId) -> Option<CommentRecord> {
        self.tasks.iter().find_map(|task| {
            task.comment(id).map(|comment| CommentRecord {
                task_id: task.id,
                comment: comment.clone(),
            })
        })
    }

    fn contains(&self, kind: EntityKind, id: Uuid) -> bool {
        match kind {
            EntityKind::User => self.user(id).is_some(),
            EntityKind::Task => self.task(id).is_some(),
            EntityKind::Comment => self.tasks.iter().any(|task| task.comment(id).is_some()),
            EntityKind::Notification => self.notification(id).is_some(),
        }
    }

    /// Current local copy of one entity.
    fn entity(&self, kind: EntityKind, id: Uuid) -> Option<Entity> {
        match kind {
            EntityKind::User => self.user(id).cloned().map(Entity::User),
            EntityKind::Task => self.task(id).cloned().map(Entity::Task),
            EntityKind::Comment => self.find_comment(id).map(Entity::Comment),
            EntityKind::Notification => self.notification(id).cloned().map(Entity::Notification),
        }
    }

    /// Overwrites the local copy of an existing entity. Task comments are
    /// kept since they travel separately.
    fn adopt(&mut self, entity: Entity) {
        match entity {
            Entity::User(user) => {
                if let Some(slot) = self.users.iter_mut().find(|slot| slot.id == user.id) {
                    *slot = user.clone();
                }
                self.session.refresh(&user);
            }
            Entity::Task(task) => {
                if let Some(slot) = self.tasks.iter_mut().find(|slot| slot.id == task.id) {
                    let comments = std::mem::take(&mut slot.comments);
                    *slot = Task { comments, ..task };
                }
            }
            Entity::Comment(record) => {
                let slot = self
                    .tasks
                    .iter_mut()
                    .find(|task| task.id == record.task_id)
                    .and_then(|task| task.comment_mut(record.comment.id));
                if let Some(slot) = slot {
                    *slot = record.comment;
                }
            }
            Entity::Notification(notification) => {
                if let Some(slot) = self
                    .notifications
                    .iter_mut()
                    .find(|slot| slot.id == notification.id)
                {
                    *slot = notification;
                }
            }
        }
    }

    /// Inserts an entity at `position` (clamped) or at the end.
    fn insert_entity_at(&mut self, entity: Entity, position: Option<usize>) -> bool {
        fn place<T>(items: &mut Vec<T>, item: T, position: Option<usize>) {
            let index = position.map_or(items.len(), |index| index.min(items.len()));
            items.insert(index, item);
        }

        match entity {
            Entity::User(user) => place(&mut self.users, user, position),
            Entity::Task(task) => place(&mut self.tasks, task, position),
            Entity::Comment(record) => {
                let Some(task) = self.tasks.iter_mut().find(|task| task.id == record.task_id)
                else {
                    debug!(
                        "event=remote_pull module=store status=orphan_comment comment_id={} task_id={}",
                        record.comment.id, record.task_id
                    );
                    return false;
                };
                place(&mut task.comments, record.comment, position);
            }
            Entity::Notification(notification) => {
                place(&mut self.notifications, notification, position)
            }
        }
        true
    }

    fn remove_entity(&mut self, kind: EntityKind, id: Uuid) -> bool {
        match kind {
            EntityKind::User => remove_where(&mut self.users, |user| user.id == id),
            EntityKind::Task => remove_where(&mut self.tasks, |task| task.id == id),
            EntityKind::Comment => self
                .tasks
                .iter_mut()
                .any(|task| remove_where(&mut task.comments, |comment| comment.id == id)),
            EntityKind::Notification => {
                remove_where(&mut self.notifications, |notification| notification.id == id)
            }
        }
    }
}

fn remove_where<T>(items: &mut Vec<T>, predicate: impl Fn(&T) -> bool) -> bool {
    match items.iter().position(predicate) {
        Some(index) => {
            items.remove(index);
            true
        }
        None => false,
    }
}

fn truncate_to_millis(instant: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(instant.timestamp_millis()).unwrap_or(instant)
}

fn failure_message(kind: EntityKind, reason: &str) -> String {
    format!("Could not save {kind} changes ({reason}); the last saved version was restored")
}

#[cfg(test)]
mod tests {
    use super::{truncate_to_millis, DomainStore, StoreState};
    use crate::clock::ManualClock;
    use crate::model::task::{NewTask, TaskPatch, TaskStatus};
    use crate::model::user::{Role, User};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use std::sync::Arc;

    fn store_with_users() -> (DomainStore, User, User) {
        let admin = User::new("Alice Admin", "alice@example.com", "secret", Role::Admin);
        let employee = User::new("Eve Employee", "eve@example.com", "secret", Role::Employee);
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap(),
        ));
        let state = StoreState {
            users: vec![admin.clone(), employee.clone()],
            ..StoreState::default()
        };
        (DomainStore::new(state, clock), admin, employee)
    }

    #[test]
    fn memory_store_never_records_pending_changes() {
        let (mut store, admin, employee) = store_with_users();
        let due = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();

        let task = store
            .create_task(NewTask::new("Ship", employee.id, admin.id, due))
            .unwrap();

        assert_eq!(store.pending_count(), 0);
        assert!(!store.is_pending(task.id));
        assert_eq!(store.flush().unwrap().confirmed, 0);
    }

    #[test]
    fn update_task_notification_uses_previous_title() {
        let (mut store, admin, employee) = store_with_users();
        let due = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let task = store
            .create_task(NewTask::new("Old title", employee.id, admin.id, due))
            .unwrap();

        let patch = TaskPatch {
            title: Some("New title".to_string()),
            status: Some(TaskStatus::InReview),
            ..TaskPatch::default()
        };
        let updated = store.update_task(task.id, &patch).unwrap();

        assert_eq!(updated.title, "New title");
        assert_eq!(updated.created_at, task.created_at);
        let last = store.notifications().last().unwrap();
        assert_eq!(last.message, "Task \"Old title\" has been updated");
        assert_eq!(last.task_id, Some(task.id));
    }

    #[test]
    fn principal_missing_from_users_starts_signed_out() {
        let ghost = User::new("Ghost", "ghost@example.com", "pw", Role::Admin);
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let state = StoreState {
            current_user: Some(ghost),
            ..StoreState::default()
        };

        let store = DomainStore::new(state, clock);
        assert!(!store.session().is_authenticated());
    }

    #[test]
    fn timestamps_are_truncated_to_millis() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + Duration::nanoseconds(1_234_567);
        let truncated = truncate_to_millis(instant);
        assert_eq!(truncated.timestamp_subsec_nanos(), 1_000_000);
    }
}
