//! User and role model.
//!
//! # Invariants
//! - `email` is unique across the user collection.
//! - `password` is an opaque credential; it is compared, never inspected or
//!   logged.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use uuid::Uuid;

pub type UserId = Uuid;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// Organisational role. Drives task visibility and management rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Employee,
}

impl Role {
    /// Stable storage/wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Employee => "employee",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "manager" => Some(Self::Manager),
            "employee" => Some(Self::Employee),
            _ => None,
        }
    }
}

/// Team member record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl User {
    /// Creates a user with a generated stable ID and no optional profile data.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        role: Role,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), name, email, password, role)
    }

    /// Creates a user with a caller-provided ID (seed/import paths).
    pub fn with_id(
        id: UserId,
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
            password: password.into(),
            role,
            phone: None,
            department: None,
            avatar: None,
        }
    }

    /// Exact, case-sensitive credential comparison.
    pub fn matches_credentials(&self, email: &str, password: &str) -> bool {
        self.email == email && self.password == password
    }
}

impl Debug for User {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .field("phone", &self.phone)
            .field("department", &self.department)
            .field("avatar", &self.avatar)
            .finish()
    }
}

/// Partial profile update. `None` leaves a field untouched.
///
/// Optional profile fields use `Option<Option<_>>`: `Some(None)` clears the
/// stored value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub phone: Option<Option<String>>,
    pub department: Option<Option<String>>,
    pub avatar: Option<Option<String>>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.password.is_none()
            && self.role.is_none()
            && self.phone.is_none()
            && self.department.is_none()
            && self.avatar.is_none()
    }

    /// Merges provided fields into `user`.
    pub fn apply_to(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
        if let Some(password) = &self.password {
            user.password = password.clone();
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(phone) = &self.phone {
            user.phone = phone.clone();
        }
        if let Some(department) = &self.department {
            user.department = department.clone();
        }
        if let Some(avatar) = &self.avatar {
            user.avatar = avatar.clone();
        }
    }
}

impl Debug for UserPatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserPatch")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("role", &self.role)
            .field("phone", &self.phone)
            .field("department", &self.department)
            .field("avatar", &self.avatar)
            .finish()
    }
}

/// Returns whether `value` has the shape of an email address.
pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}

#[cfg(test)]
mod tests {
    use super::{is_valid_email, Role, User, UserPatch};

    #[test]
    fn debug_output_redacts_password() {
        let user = User::new("Ada", "ada@example.com", "hunter2", Role::Employee);
        let rendered = format!("{user:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn credentials_are_case_sensitive() {
        let user = User::new("Ada", "ada@example.com", "Secret", Role::Employee);
        assert!(user.matches_credentials("ada@example.com", "Secret"));
        assert!(!user.matches_credentials("ADA@example.com", "Secret"));
        assert!(!user.matches_credentials("ada@example.com", "secret"));
    }

    #[test]
    fn patch_clears_optional_fields_with_some_none() {
        let mut user = User::new("Ada", "ada@example.com", "pw", Role::Manager);
        user.phone = Some("555-0100".to_string());

        let patch = UserPatch {
            phone: Some(None),
            department: Some(Some("Design".to_string())),
            ..UserPatch::default()
        };
        patch.apply_to(&mut user);

        assert_eq!(user.phone, None);
        assert_eq!(user.department.as_deref(), Some("Design"));
        assert_eq!(user.name, "Ada");
    }

    #[test]
    fn email_shape_check() {
        assert!(is_valid_email("sam@team.io"));
        assert!(!is_valid_email("sam@team"));
        assert!(!is_valid_email("sam team@team.io"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn role_round_trips_through_storage_name() {
        for role in [Role::Admin, Role::Manager, Role::Employee] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("member"), None);
    }
}
