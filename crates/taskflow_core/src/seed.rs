//! Built-in demo dataset used when no stored data exists.
//!
//! Due dates are relative to the supplied instant so the dataset always has
//! overdue, upcoming and far-off work.

use crate::model::notification::{Audience, Notification, NotificationKind};
use crate::model::task::{Comment, Task, TaskPriority, TaskStatus};
use crate::model::user::{Role, User};
use crate::store::StoreState;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

struct SeedUser {
    id: Uuid,
    name: &'static str,
    email: &'static str,
    password: &'static str,
    role: Role,
    department: &'static str,
    phone: &'static str,
}

const SEED_USERS: [SeedUser; 5] = [
    SeedUser {
        id: Uuid::from_u128(0x5f0c_1a2b_0001_4000_8000_000000000001),
        name: "Sarah Johnson",
        email: "admin@taskflow.dev",
        password: "admin123",
        role: Role::Admin,
        department: "Management",
        phone: "+1 555 0100",
    },
    SeedUser {
        id: Uuid::from_u128(0x5f0c_1a2b_0001_4000_8000_000000000002),
        name: "Michael Chen",
        email: "manager@taskflow.dev",
        password: "manager123",
        role: Role::Manager,
        department: "Engineering",
        phone: "+1 555 0101",
    },
    SeedUser {
        id: Uuid::from_u128(0x5f0c_1a2b_0001_4000_8000_000000000003),
        name: "Emily Davis",
        email: "emily@taskflow.dev",
        password: "employee123",
        role: Role::Employee,
        department: "Engineering",
        phone: "+1 555 0102",
    },
    SeedUser {
        id: Uuid::from_u128(0x5f0c_1a2b_0001_4000_8000_000000000004),
        name: "James Wilson",
        email: "james@taskflow.dev",
        password: "employee123",
        role: Role::Employee,
        department: "Design",
        phone: "+1 555 0103",
    },
    SeedUser {
        id: Uuid::from_u128(0x5f0c_1a2b_0001_4000_8000_000000000005),
        name: "Olivia Martinez",
        email: "olivia@taskflow.dev",
        password: "employee123",
        role: Role::Employee,
        department: "Marketing",
        phone: "+1 555 0104",
    },
];

struct SeedTask {
    title: &'static str,
    description: &'static str,
    status: TaskStatus,
    priority: TaskPriority,
    /// Index into the user list.
    assignee: usize,
    creator: usize,
    due_in_days: i64,
}

const SEED_TASKS: [SeedTask; 6] = [
    SeedTask {
        title: "Design landing page mockups",
        description: "Hero section, pricing table and footer variants.",
        status: TaskStatus::InProgress,
        priority: TaskPriority::High,
        assignee: 3,
        creator: 1,
        due_in_days: 3,
    },
    SeedTask {
        title: "Set up CI pipeline",
        description: "Build, lint and test on every push.",
        status: TaskStatus::Todo,
        priority: TaskPriority::Medium,
        assignee: 2,
        creator: 1,
        due_in_days: 7,
    },
    SeedTask {
        title: "Fix login redirect bug",
        description: "Users land on a blank page after signing in.",
        status: TaskStatus::InReview,
        priority: TaskPriority::High,
        assignee: 2,
        creator: 0,
        due_in_days: 1,
    },
    SeedTask {
        title: "Write Q3 campaign brief",
        description: "Audience, channels and budget split.",
        status: TaskStatus::Todo,
        priority: TaskPriority::Low,
        assignee: 4,
        creator: 0,
        due_in_days: 14,
    },
    SeedTask {
        title: "Quarterly roadmap review",
        description: "Collect team input before the planning meeting.",
        status: TaskStatus::Completed,
        priority: TaskPriority::Medium,
        assignee: 1,
        creator: 0,
        due_in_days: -2,
    },
    SeedTask {
        title: "Update onboarding docs",
        description: "Reflect the new tooling and access request flow.",
        status: TaskStatus::InProgress,
        priority: TaskPriority::Low,
        assignee: 4,
        creator: 1,
        due_in_days: -1,
    },
];

/// Seed users. Ids are fixed so stored tasks and a stored principal still
/// resolve when only the user records fall back to the seed.
pub fn seed_users() -> Vec<User> {
    SEED_USERS
        .iter()
        .map(|seed| {
            let mut user = User::with_id(seed.id, seed.name, seed.email, seed.password, seed.role);
            user.department = Some(seed.department.to_string());
            user.phone = Some(seed.phone.to_string());
            user
        })
        .collect()
}

/// Seed tasks assigned across `users`.
///
/// Seed indices wrap around when `users` is shorter than the built-in list;
/// an empty `users` yields no tasks.
pub fn seed_tasks(users: &[User], now: DateTime<Utc>) -> Vec<Task> {
    if users.is_empty() {
        return Vec::new();
    }
    let today = now.date_naive();

    SEED_TASKS
        .iter()
        .enumerate()
        .map(|(index, seed)| {
            let assignee = &users[seed.assignee % users.len()];
            let creator = &users[seed.creator % users.len()];
            let created_at = now - Duration::days(10) + Duration::hours(index as i64);
            let mut task = Task {
                id: Uuid::new_v4(),
                title: seed.title.to_string(),
                description: Some(seed.description.to_string()),
                status: seed.status,
                priority: seed.priority,
                assignee_id: assignee.id,
                created_by: creator.id,
                due_date: today + Duration::days(seed.due_in_days),
                created_at,
                comments: Vec::new(),
            };
            if seed.status == TaskStatus::InReview {
                task.comments.push(Comment {
                    id: Uuid::new_v4(),
                    text: "Fix is up for review, please take a look.".to_string(),
                    author_id: assignee.id,
                    created_at: created_at + Duration::days(1),
                    edited_at: None,
                });
            }
            task
        })
        .collect()
}

/// The welcome broadcast.
pub fn seed_notifications(now: DateTime<Utc>) -> Vec<Notification> {
    vec![Notification {
        id: Uuid::new_v4(),
        kind: NotificationKind::Info,
        message: "Welcome to TaskFlow! Your workspace is ready.".to_string(),
        audience: Audience::Broadcast,
        task_id: None,
        created_at: now - Duration::days(10),
        read: false,
    }]
}

/// Full seed dataset, signed out, light theme.
pub fn seed_state(now: DateTime<Utc>) -> StoreState {
    let users = seed_users();
    let tasks = seed_tasks(&users, now);
    StoreState {
        users,
        tasks,
        notifications: seed_notifications(now),
        current_user: None,
        theme: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::{seed_state, seed_tasks, seed_users};
    use crate::model::task::TaskStatus;
    use crate::model::user::Role;
    use chrono::{TimeZone, Utc};

    #[test]
    fn seed_covers_every_role_and_status() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let state = seed_state(now);

        for role in [Role::Admin, Role::Manager, Role::Employee] {
            assert!(state.users.iter().any(|user| user.role == role));
        }
        for status in TaskStatus::ALL {
            assert!(state.tasks.iter().any(|task| task.status == status));
        }
        assert!(state.tasks.iter().all(|task| state
            .users
            .iter()
            .any(|user| user.id == task.assignee_id)));
        assert_eq!(state.notifications.len(), 1);
        assert!(state.current_user.is_none());
    }

    #[test]
    fn seed_user_ids_are_stable_and_distinct() {
        let first = seed_users();
        let second = seed_users();
        let ids: Vec<_> = first.iter().map(|user| user.id).collect();

        assert_eq!(ids, second.iter().map(|user| user.id).collect::<Vec<_>>());
        for (index, id) in ids.iter().enumerate() {
            assert!(!ids[index + 1..].contains(id));
        }
    }

    #[test]
    fn seed_tasks_without_users_is_empty() {
        assert!(seed_tasks(&[], Utc::now()).is_empty());
    }

    #[test]
    fn seed_comments_are_after_task_creation() {
        let state = seed_state(Utc::now());
        for task in &state.tasks {
            for comment in &task.comments {
                assert!(comment.created_at > task.created_at);
            }
        }
    }
}
