//! Notification feed for one user.

use crate::model::notification::Notification;
use crate::model::user::UserId;
use crate::store::StoreSnapshot;

/// Broadcasts plus notifications addressed to `user_id`, most recent first.
///
/// Equal timestamps keep reverse insertion order.
pub fn notifications_for<'a>(snapshot: &StoreSnapshot<'a>, user_id: UserId) -> Vec<&'a Notification> {
    let mut feed: Vec<&'a Notification> = snapshot
        .notifications
        .iter()
        .rev()
        .filter(|notification| notification.audience.includes(user_id))
        .collect();
    feed.sort_by(|left, right| right.created_at.cmp(&left.created_at));
    feed
}

pub fn unread_count(snapshot: &StoreSnapshot<'_>, user_id: UserId) -> usize {
    snapshot
        .notifications
        .iter()
        .filter(|notification| notification.audience.includes(user_id) && !notification.read)
        .count()
}
