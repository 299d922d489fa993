//! Core domain logic for TaskFlow.
//! This crate is the single source of truth for business invariants.

pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod persistence;
pub mod seed;
pub mod session;
pub mod store;
pub mod views;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, CoreConfig, StorageMode};
pub use logging::{
    default_log_level, init_from_config, init_logging, logging_status, LogTarget, LoggingError,
};
pub use model::notification::{
    Audience, NewNotification, Notification, NotificationId, NotificationKind,
};
pub use model::task::{
    Comment, CommentId, NewComment, NewTask, Task, TaskId, TaskPatch, TaskPriority, TaskStatus,
};
pub use model::theme::Theme;
pub use model::user::{Role, User, UserId, UserPatch};
pub use model::validation::ValidationError;
pub use persistence::snapshot::{LocalSnapshot, SnapshotError, SnapshotKey};
pub use persistence::sqlite_adapter::SqliteAdapter;
pub use persistence::{
    AdapterError, AdapterResult, ChangeEvent, CommentRecord, Entity, EntityKind,
    PersistenceAdapter,
};
pub use session::Session;
pub use store::{
    AuthError, DomainStore, FlushReport, RolledBackChange, StoreError, StoreResult,
    StoreSnapshot, StoreState,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
