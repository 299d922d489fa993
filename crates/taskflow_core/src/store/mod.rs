//! Domain store: single owner of all entities and their mutators.
//!
//! # Responsibility
//! - Apply every mutation together with the notification it causes.
//! - Track optimistic local changes until the persistence layer confirms or
//!   rejects them.
//!
//! # Invariants
//! - Callers never mutate entities directly; only store operations do.
//! - A mutation and its notification land in the same call.
//! - Failures are returned as `StoreError`; none of them are fatal.

mod domain_store;
mod error;
mod pending;

pub use domain_store::{DomainStore, StoreSnapshot, StoreState};
pub use error::{AuthError, StoreError, StoreResult};
pub use pending::{FlushReport, RolledBackChange};
