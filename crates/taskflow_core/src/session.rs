//! Current principal and role-based access predicates.
//!
//! # Responsibility
//! - Hold at most one authenticated user.
//! - Be the only place where role rules are written down.
//!
//! # Invariants
//! - Views and mutators call these predicates instead of matching on `Role`.

use crate::model::task::Comment;
use crate::model::user::{Role, User, UserId};

/// Returns whether `user` may see and manage every task.
///
/// Admins and managers manage tasks; everybody else works only on what is
/// assigned to them.
pub fn can_manage_tasks(user: &User) -> bool {
    matches!(user.role, Role::Admin | Role::Manager)
}

/// Returns whether `user` authored `comment`.
pub fn is_comment_author(user: &User, comment: &Comment) -> bool {
    comment.author_id == user.id
}

/// Authentication state of one client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    principal: Option<User>,
}

impl Session {
    /// Signed-out session.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_principal(user: User) -> Self {
        Self {
            principal: Some(user),
        }
    }

    pub fn principal(&self) -> Option<&User> {
        self.principal.as_ref()
    }

    pub fn principal_id(&self) -> Option<UserId> {
        self.principal.as_ref().map(|user| user.id)
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    /// True iff a principal is signed in with a task-managing role.
    pub fn can_manage_tasks(&self) -> bool {
        self.principal.as_ref().is_some_and(can_manage_tasks)
    }

    /// True iff a principal is signed in and wrote `comment`.
    pub fn can_edit_own_comment(&self, comment: &Comment) -> bool {
        self.principal
            .as_ref()
            .is_some_and(|user| is_comment_author(user, comment))
    }

    pub(crate) fn is_principal(&self, user_id: UserId) -> bool {
        self.principal_id() == Some(user_id)
    }

    pub(crate) fn sign_in(&mut self, user: User) {
        self.principal = Some(user);
    }

    pub(crate) fn sign_out(&mut self) -> Option<User> {
        self.principal.take()
    }

    /// Replaces the principal record in place, keeping the session signed in.
    pub(crate) fn refresh(&mut self, user: &User) {
        if self.is_principal(user.id) {
            self.principal = Some(user.clone());
        }
    }
}
