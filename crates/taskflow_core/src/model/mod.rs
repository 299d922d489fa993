//! Domain model for users, tasks, comments and notifications.
//!
//! # Responsibility
//! - Define the canonical entity shapes owned by the domain store.
//! - Provide patch types that merge only the fields a caller supplies.
//!
//! # Invariants
//! - Every entity is identified by a stable UUID that is never reused.
//! - Comments have no identity outside their parent task.
//! - Notification messages are rendered once, at creation time.

pub mod notification;
pub mod task;
pub mod theme;
pub mod user;
pub mod validation;
