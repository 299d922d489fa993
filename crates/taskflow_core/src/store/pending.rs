//! Optimistic-change bookkeeping for the two-phase apply.
//!
//! # Invariants
//! - At most one pending change exists per `(kind, id)`; later edits fold
//!   into it and the earliest baseline is kept for rollback.
//! - An insert followed by a remove before flush cancels out.

use crate::persistence::{Entity, EntityKind};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PendingOp {
    Insert,
    Update { previous: Entity },
    /// `position` is the index the entity held in its collection.
    Remove { previous: Entity, position: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingChange {
    pub(crate) kind: EntityKind,
    pub(crate) id: Uuid,
    pub(crate) op: PendingOp,
}

/// Ordered queue of unconfirmed local changes.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    changes: Vec<PendingChange>,
}

impl PendingQueue {
    pub(crate) fn len(&self) -> usize {
        self.changes.len()
    }

    pub(crate) fn contains(&self, id: Uuid) -> bool {
        self.changes.iter().any(|change| change.id == id)
    }

    pub(crate) fn record(&mut self, kind: EntityKind, id: Uuid, op: PendingOp) {
        let existing = self
            .changes
            .iter()
            .position(|change| change.kind == kind && change.id == id);

        let Some(index) = existing else {
            self.changes.push(PendingChange { kind, id, op });
            return;
        };

        let merged = match (&self.changes[index].op, op) {
            // Never reached storage; nothing to send.
            (PendingOp::Insert, PendingOp::Remove { .. }) => None,
            (PendingOp::Update { previous }, PendingOp::Remove { position, .. }) => {
                Some(PendingOp::Remove {
                    previous: previous.clone(),
                    position,
                })
            }
            // Insert/update send the current local state at flush time.
            (existing, _) => Some(existing.clone()),
        };

        match merged {
            Some(op) => self.changes[index].op = op,
            None => {
                self.changes.remove(index);
            }
        }
    }

    /// Drops every pending change for `id`.
    pub(crate) fn discard(&mut self, id: Uuid) {
        self.changes.retain(|change| change.id != id);
    }

    /// Swaps the rollback baseline of a pending change for `id`, if any.
    ///
    /// Used when the backing store reports a newer authoritative version
    /// while a local change is still unconfirmed.
    pub(crate) fn rebase(&mut self, id: Uuid, authoritative: Entity) -> bool {
        let Some(change) = self.changes.iter_mut().find(|change| change.id == id) else {
            return false;
        };
        match &mut change.op {
            PendingOp::Update { previous } | PendingOp::Remove { previous, .. } => {
                *previous = authoritative;
            }
            PendingOp::Insert => {}
        }
        true
    }

    pub(crate) fn take_all(&mut self) -> Vec<PendingChange> {
        std::mem::take(&mut self.changes)
    }

    pub(crate) fn clear(&mut self) {
        self.changes.clear();
    }
}

/// A change the backing store rejected and the store reverted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolledBackChange {
    pub kind: EntityKind,
    pub id: Uuid,
    /// Adapter failure text.
    pub reason: String,
}

/// Outcome of one `DomainStore::flush` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Changes the backing store accepted.
    pub confirmed: usize,
    /// Changes reverted locally after a rejection.
    pub rolled_back: Vec<RolledBackChange>,
    /// Notification writes that failed; the local copy was kept.
    pub unsaved_notifications: usize,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.rolled_back.is_empty() && self.unsaved_notifications == 0
    }
}

#[cfg(test)]
mod tests {
    use super::{PendingOp, PendingQueue};
    use crate::model::user::{Role, User};
    use crate::persistence::{Entity, EntityKind};

    fn user_entity() -> Entity {
        Entity::User(User::new("Ada", "ada@example.com", "pw", Role::Admin))
    }

    #[test]
    fn insert_then_remove_cancels_out() {
        let mut queue = PendingQueue::default();
        let entity = user_entity();
        let id = entity.id();

        queue.record(EntityKind::User, id, PendingOp::Insert);
        queue.record(
            EntityKind::User,
            id,
            PendingOp::Remove {
                previous: entity,
                position: 0,
            },
        );

        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn repeated_updates_keep_first_baseline() {
        let mut queue = PendingQueue::default();
        let first = user_entity();
        let id = first.id();
        let mut second = first.clone();
        if let Entity::User(user) = &mut second {
            user.name = "Changed".to_string();
        }

        queue.record(EntityKind::User, id, PendingOp::Update { previous: first.clone() });
        queue.record(EntityKind::User, id, PendingOp::Update { previous: second });

        let changes = queue.take_all();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].op, PendingOp::Update { previous: first });
    }

    #[test]
    fn update_then_remove_keeps_original_baseline() {
        let mut queue = PendingQueue::default();
        let original = user_entity();
        let id = original.id();

        queue.record(EntityKind::User, id, PendingOp::Update { previous: original.clone() });
        queue.record(
            EntityKind::User,
            id,
            PendingOp::Remove {
                previous: user_entity(),
                position: 3,
            },
        );

        let changes = queue.take_all();
        assert_eq!(
            changes[0].op,
            PendingOp::Remove {
                previous: original,
                position: 3
            }
        );
    }
}
