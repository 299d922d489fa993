//! Input validation failures reported by domain mutators.

use crate::model::user::UserId;
use chrono::NaiveDate;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Bad caller input. Nothing is mutated when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Task title is blank after trim.
    EmptyTitle,
    /// No assignee was selected.
    MissingAssignee,
    AssigneeNotFound(UserId),
    CreatorNotFound(UserId),
    /// Due date is today or earlier.
    DueDateNotInFuture { due_date: NaiveDate, today: NaiveDate },
    /// Comment text is blank after trim.
    EmptyCommentText,
    AuthorNotFound(UserId),
    /// Notification message is blank after trim.
    EmptyMessage,
    EmptyUserName,
    InvalidEmail(String),
    DuplicateEmail(String),
    /// Imported user id is already taken.
    DuplicateUserId(UserId),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "task title must not be blank"),
            Self::MissingAssignee => write!(f, "task assignee is required"),
            Self::AssigneeNotFound(id) => write!(f, "assignee not found: {id}"),
            Self::CreatorNotFound(id) => write!(f, "task creator not found: {id}"),
            Self::DueDateNotInFuture { due_date, today } => {
                write!(f, "due date {due_date} must be after {today}")
            }
            Self::EmptyCommentText => write!(f, "comment text must not be blank"),
            Self::AuthorNotFound(id) => write!(f, "comment author not found: {id}"),
            Self::EmptyMessage => write!(f, "notification message must not be blank"),
            Self::EmptyUserName => write!(f, "user name must not be blank"),
            Self::InvalidEmail(value) => write!(f, "invalid email address: `{value}`"),
            Self::DuplicateEmail(value) => write!(f, "email already in use: `{value}`"),
            Self::DuplicateUserId(id) => write!(f, "user id already in use: {id}"),
        }
    }
}

impl Error for ValidationError {}
