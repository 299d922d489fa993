//! Read-only projections over a `StoreSnapshot`.
//!
//! # Invariants
//! - Views never mutate store state.
//! - Every task view starts from `visible_tasks_for`, so non-privileged
//!   users only ever see their own assignments.

pub mod notification_views;
pub mod task_views;
