//! Store-level error taxonomy.

use crate::model::validation::ValidationError;
use crate::persistence::snapshot::SnapshotError;
use crate::persistence::{AdapterError, EntityKind};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type StoreResult<T> = Result<T, StoreError>;

/// Credential and session failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No user matches the email/password pair.
    InvalidCredentials,
    /// Operation needs a signed-in principal.
    NotAuthenticated,
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "invalid credentials"),
            Self::NotAuthenticated => write!(f, "no user is signed in"),
        }
    }
}

impl Error for AuthError {}

/// Failure of one store operation. The `Display` text is the user-facing
/// reason.
#[derive(Debug)]
pub enum StoreError {
    Validation(ValidationError),
    NotFound { kind: EntityKind, id: Uuid },
    Auth(AuthError),
    Persistence(AdapterError),
    Snapshot(SnapshotError),
}

impl StoreError {
    pub(crate) fn not_found(kind: EntityKind, id: Uuid) -> Self {
        Self::NotFound { kind, id }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            Self::Auth(err) => write!(f, "{err}"),
            Self::Persistence(err) => write!(f, "{err}"),
            Self::Snapshot(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::NotFound { .. } => None,
            Self::Auth(err) => Some(err),
            Self::Persistence(err) => Some(err),
            Self::Snapshot(err) => Some(err),
        }
    }
}

impl From<ValidationError> for StoreError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<AuthError> for StoreError {
    fn from(value: AuthError) -> Self {
        Self::Auth(value)
    }
}

impl From<AdapterError> for StoreError {
    fn from(value: AdapterError) -> Self {
        Self::Persistence(value)
    }
}

impl From<SnapshotError> for StoreError {
    fn from(value: SnapshotError) -> Self {
        Self::Snapshot(value)
    }
}
