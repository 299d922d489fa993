//! Notification model.
//!
//! # Invariants
//! - `message` is rendered at creation and never recomputed.
//! - `read` only moves from `false` to `true`.

use crate::model::task::TaskId;
use crate::model::user::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type NotificationId = Uuid;

/// Visual severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Info,
    Success,
    /// Also used for failures surfaced to the user.
    Warning,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "info" => Some(Self::Info),
            "success" => Some(Self::Success),
            "warning" => Some(Self::Warning),
            _ => None,
        }
    }
}

/// Who a notification is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// Visible to every user.
    Broadcast,
    /// Visible to one user only.
    User(UserId),
}

impl Audience {
    pub fn includes(self, user_id: UserId) -> bool {
        match self {
            Self::Broadcast => true,
            Self::User(target) => target == user_id,
        }
    }

    /// Addressed user, or `None` for broadcasts.
    pub fn user_id(self) -> Option<UserId> {
        match self {
            Self::Broadcast => None,
            Self::User(target) => Some(target),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    pub audience: Audience,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    /// Marks the notification read. Returns whether the flag changed.
    pub fn mark_read(&mut self) -> bool {
        let changed = !self.read;
        self.read = true;
        changed
    }
}

/// Input for a new notification; the store assigns id, time and read state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub message: String,
    pub audience: Audience,
    pub task_id: Option<TaskId>,
}

impl NewNotification {
    pub fn broadcast(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            audience: Audience::Broadcast,
            task_id: None,
        }
    }

    pub fn addressed(kind: NotificationKind, user_id: UserId, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            audience: Audience::User(user_id),
            task_id: None,
        }
    }

    pub fn for_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }
}
