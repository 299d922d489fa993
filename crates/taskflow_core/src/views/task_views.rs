//! Task list, board, calendar and team projections.

use crate::model::task::{Task, TaskPriority, TaskStatus};
use crate::model::user::{User, UserId};
use crate::session::{can_manage_tasks, Session};
use crate::store::StoreSnapshot;
use chrono::{Datelike, NaiveDate};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Ordering applied by `sort_tasks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Earliest due date first.
    #[default]
    DueDate,
    /// High, then medium, then low.
    Priority,
    /// Alphabetical title order; accents and case only break ties.
    Title,
}

/// Combined list-page query. `None` filters mean "all".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    pub search: String,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub sort: SortKey,
}

/// Counts shown on the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusStats {
    pub total: usize,
    pub todo: usize,
    pub in_progress: usize,
    pub in_review: usize,
    pub completed: usize,
}

/// One kanban column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardColumn<'a> {
    pub status: TaskStatus,
    pub tasks: Vec<&'a Task>,
}

/// Per-member task counts for the team page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Workload {
    pub assigned: usize,
    pub completed: usize,
}

/// Tasks `viewer` may see: everything for admins and managers, otherwise
/// only tasks assigned to the viewer.
pub fn visible_tasks_for<'a>(snapshot: &StoreSnapshot<'a>, viewer: &User) -> Vec<&'a Task> {
    if can_manage_tasks(viewer) {
        return snapshot.tasks.iter().collect();
    }
    snapshot
        .tasks
        .iter()
        .filter(|task| task.assignee_id == viewer.id)
        .collect()
}

/// Session-gated variant; signed-out sessions see nothing.
pub fn visible_tasks<'a>(snapshot: &StoreSnapshot<'a>, session: &Session) -> Vec<&'a Task> {
    match session.principal() {
        Some(viewer) => visible_tasks_for(snapshot, viewer),
        None => Vec::new(),
    }
}

/// Case-insensitive substring match over title, description and assignee
/// name. The query is used as typed; only an empty query keeps every task.
pub fn filter_by_search<'a>(tasks: Vec<&'a Task>, users: &[User], query: &str) -> Vec<&'a Task> {
    let needle = query.to_lowercase();
    if needle.is_empty() {
        return tasks;
    }

    tasks
        .into_iter()
        .filter(|task| {
            let in_title = task.title.to_lowercase().contains(&needle);
            let in_description = task
                .description
                .as_deref()
                .is_some_and(|text| text.to_lowercase().contains(&needle));
            let in_assignee = users
                .iter()
                .find(|user| user.id == task.assignee_id)
                .is_some_and(|user| user.name.to_lowercase().contains(&needle));
            in_title || in_description || in_assignee
        })
        .collect()
}

pub fn filter_by_status(tasks: Vec<&Task>, status: Option<TaskStatus>) -> Vec<&Task> {
    match status {
        Some(status) => tasks.into_iter().filter(|task| task.status == status).collect(),
        None => tasks,
    }
}

pub fn filter_by_priority(tasks: Vec<&Task>, priority: Option<TaskPriority>) -> Vec<&Task> {
    match priority {
        Some(priority) => tasks
            .into_iter()
            .filter(|task| task.priority == priority)
            .collect(),
        None => tasks,
    }
}

/// Stable in-place sort.
pub fn sort_tasks(tasks: &mut [&Task], key: SortKey) {
    match key {
        SortKey::DueDate => tasks.sort_by_key(|task| task.due_date),
        SortKey::Priority => tasks.sort_by_key(|task| task.priority.rank()),
        SortKey::Title => tasks.sort_by(|left, right| compare_titles(&left.title, &right.title)),
    }
}

/// Multi-level comparison: base letters, then accents, then case, then the
/// raw text.
fn compare_titles(left: &str, right: &str) -> Ordering {
    base_letters(left)
        .cmp(&base_letters(right))
        .then_with(|| folded(left).cmp(&folded(right)))
        .then_with(|| case_order(left).cmp(&case_order(right)))
        .then_with(|| left.cmp(right))
}

fn base_letters(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

fn folded(text: &str) -> String {
    text.nfd().collect::<String>().to_lowercase()
}

// Lowercase sorts before uppercase at the same position.
fn case_order(text: &str) -> Vec<bool> {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(char::is_uppercase)
        .collect()
}

/// Visibility gate, search, filters and sort in list-page order.
pub fn task_list<'a>(snapshot: &StoreSnapshot<'a>, viewer: &User, query: &TaskQuery) -> Vec<&'a Task> {
    let tasks = visible_tasks_for(snapshot, viewer);
    let tasks = filter_by_search(tasks, snapshot.users, &query.search);
    let tasks = filter_by_status(tasks, query.status);
    let mut tasks = filter_by_priority(tasks, query.priority);
    sort_tasks(&mut tasks, query.sort);
    tasks
}

pub fn tasks_due_on<'a>(tasks: &[&'a Task], day: NaiveDate) -> Vec<&'a Task> {
    tasks
        .iter()
        .copied()
        .filter(|task| task.is_due_on(day))
        .collect()
}

pub fn stats_by_status(tasks: &[&Task]) -> StatusStats {
    let mut stats = StatusStats {
        total: tasks.len(),
        ..StatusStats::default()
    };
    for task in tasks {
        match task.status {
            TaskStatus::Todo => stats.todo += 1,
            TaskStatus::InProgress => stats.in_progress += 1,
            TaskStatus::InReview => stats.in_review += 1,
            TaskStatus::Completed => stats.completed += 1,
        }
    }
    stats
}

/// Kanban columns in workflow order; empty columns are kept.
pub fn board_columns<'a>(tasks: &[&'a Task]) -> Vec<BoardColumn<'a>> {
    TaskStatus::ALL
        .iter()
        .map(|status| BoardColumn {
            status: *status,
            tasks: tasks
                .iter()
                .copied()
                .filter(|task| task.status == *status)
                .collect(),
        })
        .collect()
}

/// Tasks grouped by due day for one calendar month. Days without tasks are
/// absent.
pub fn calendar_month<'a>(
    tasks: &[&'a Task],
    year: i32,
    month: u32,
) -> BTreeMap<NaiveDate, Vec<&'a Task>> {
    let mut days: BTreeMap<NaiveDate, Vec<&'a Task>> = BTreeMap::new();
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return days;
    };

    for day in first.iter_days().take_while(|day| day.month() == month) {
        let due = tasks_due_on(tasks, day);
        if !due.is_empty() {
            days.insert(day, due);
        }
    }
    days
}

/// Newest tasks first, at most `limit`.
pub fn recent_tasks<'a>(tasks: &[&'a Task], limit: usize) -> Vec<&'a Task> {
    let mut recent: Vec<&'a Task> = tasks.iter().rev().copied().collect();
    recent.sort_by(|left, right| right.created_at.cmp(&left.created_at));
    recent.truncate(limit);
    recent
}

pub fn tasks_by_assignee<'a>(tasks: &[&'a Task], user_id: UserId) -> Vec<&'a Task> {
    tasks
        .iter()
        .copied()
        .filter(|task| task.assignee_id == user_id)
        .collect()
}

pub fn tasks_by_creator<'a>(tasks: &[&'a Task], user_id: UserId) -> Vec<&'a Task> {
    tasks
        .iter()
        .copied()
        .filter(|task| task.created_by == user_id)
        .collect()
}

/// Team roster search over name, email, department and role.
pub fn filter_team<'a>(users: &'a [User], query: &str) -> Vec<&'a User> {
    let needle = query.to_lowercase();
    users
        .iter()
        .filter(|user| {
            needle.is_empty()
                || user.name.to_lowercase().contains(&needle)
                || user.email.to_lowercase().contains(&needle)
                || user
                    .department
                    .as_deref()
                    .is_some_and(|department| department.to_lowercase().contains(&needle))
                || user.role.as_str().contains(&needle)
        })
        .collect()
}

pub fn member_workload(snapshot: &StoreSnapshot<'_>, user_id: UserId) -> Workload {
    snapshot
        .tasks
        .iter()
        .filter(|task| task.assignee_id == user_id)
        .fold(Workload::default(), |mut workload, task| {
            workload.assigned += 1;
            if task.status == TaskStatus::Completed {
                workload.completed += 1;
            }
            workload
        })
}

#[cfg(test)]
mod tests {
    use super::{
        board_columns, calendar_month, filter_by_search, filter_team, recent_tasks, sort_tasks,
        stats_by_status, SortKey,
    };
    use crate::model::task::{Task, TaskPriority, TaskStatus};
    use crate::model::user::{Role, User};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    fn task(title: &str, priority: TaskPriority, status: TaskStatus, due: NaiveDate) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: None,
            status,
            priority,
            assignee_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            due_date: due,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            comments: Vec::new(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, d).unwrap()
    }

    #[test]
    fn priority_sort_is_stable_and_ranked() {
        let a = task("a", TaskPriority::Low, TaskStatus::Todo, day(1));
        let b = task("b", TaskPriority::High, TaskStatus::Todo, day(1));
        let c = task("c", TaskPriority::Medium, TaskStatus::Todo, day(1));
        let d = task("d", TaskPriority::High, TaskStatus::Todo, day(1));
        let mut tasks = vec![&a, &b, &c, &d];

        sort_tasks(&mut tasks, SortKey::Priority);

        let titles: Vec<_> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "d", "c", "a"]);
    }

    #[test]
    fn title_sort_ignores_case() {
        let a = task("beta", TaskPriority::Low, TaskStatus::Todo, day(1));
        let b = task("Alpha", TaskPriority::Low, TaskStatus::Todo, day(1));
        let c = task("alpha", TaskPriority::Low, TaskStatus::Todo, day(1));
        let mut tasks = vec![&a, &b, &c];

        sort_tasks(&mut tasks, SortKey::Title);

        let titles: Vec<_> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["alpha", "Alpha", "beta"]);
    }

    #[test]
    fn title_sort_places_accented_initials_with_their_base_letter() {
        let zeta = task("Zeta", TaskPriority::Low, TaskStatus::Todo, day(1));
        let emile = task("Émile", TaskPriority::Low, TaskStatus::Todo, day(1));
        let apple = task("Apple", TaskPriority::Low, TaskStatus::Todo, day(1));
        let plain = task("Emile", TaskPriority::Low, TaskStatus::Todo, day(1));
        let mut tasks = vec![&zeta, &emile, &apple, &plain];

        sort_tasks(&mut tasks, SortKey::Title);

        let titles: Vec<_> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Apple", "Emile", "Émile", "Zeta"]);
    }

    #[test]
    fn search_matches_assignee_name_and_empty_is_identity() {
        let user = User::new("Grace Hopper", "grace@example.com", "pw", Role::Employee);
        let mut owned = task("Compile", TaskPriority::Low, TaskStatus::Todo, day(1));
        owned.assignee_id = user.id;
        let other = task("Unrelated", TaskPriority::Low, TaskStatus::Todo, day(1));
        let users = vec![user];

        let hits = filter_by_search(vec![&owned, &other], &users, "HOPPER");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, owned.id);

        assert_eq!(filter_by_search(vec![&owned, &other], &users, "").len(), 2);
    }

    #[test]
    fn search_query_is_not_trimmed() {
        let user = User::new("Grace Hopper", "grace@example.com", "pw", Role::Employee);
        let mut owned = task("Compile", TaskPriority::Low, TaskStatus::Todo, day(1));
        owned.assignee_id = user.id;
        let users = vec![user];

        assert!(filter_by_search(vec![&owned], &users, "   ").is_empty());
        assert!(filter_by_search(vec![&owned], &users, "hopper ").is_empty());
        assert_eq!(filter_by_search(vec![&owned], &users, " hopper").len(), 1);
    }

    #[test]
    fn stats_and_board_cover_every_status() {
        let a = task("a", TaskPriority::Low, TaskStatus::InProgress, day(1));
        let b = task("b", TaskPriority::Low, TaskStatus::Completed, day(2));
        let c = task("c", TaskPriority::Low, TaskStatus::InProgress, day(3));
        let tasks = vec![&a, &b, &c];

        let stats = stats_by_status(&tasks);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.in_progress, 2);
        assert_eq!(stats.in_review, 0);
        assert_eq!(stats.completed, 1);

        let columns = board_columns(&tasks);
        assert_eq!(columns.len(), 4);
        assert_eq!(columns[0].status, TaskStatus::Todo);
        assert!(columns[0].tasks.is_empty());
        assert_eq!(columns[1].tasks.len(), 2);
    }

    #[test]
    fn calendar_month_groups_by_due_day_within_month() {
        let a = task("a", TaskPriority::Low, TaskStatus::Todo, day(5));
        let b = task("b", TaskPriority::Low, TaskStatus::Todo, day(5));
        let c = task("c", TaskPriority::Low, TaskStatus::Todo, day(29));
        let outside = task(
            "d",
            TaskPriority::Low,
            TaskStatus::Todo,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        );
        let tasks = vec![&a, &b, &c, &outside];

        let month = calendar_month(&tasks, 2024, 2);
        assert_eq!(month.len(), 2);
        assert_eq!(month[&day(5)].len(), 2);
        assert_eq!(month[&day(29)][0].title, "c");
        assert!(calendar_month(&tasks, 2024, 13).is_empty());
    }

    #[test]
    fn recent_tasks_are_newest_first_and_limited() {
        let mut older = task("older", TaskPriority::Low, TaskStatus::Todo, day(1));
        let mut newer = task("newer", TaskPriority::Low, TaskStatus::Todo, day(1));
        older.created_at = Utc::now() - Duration::days(2);
        newer.created_at = Utc::now();

        let recent = recent_tasks(&[&older, &newer], 1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].title, "newer");
    }

    #[test]
    fn team_filter_matches_department_and_role() {
        let mut designer = User::new("Jo", "jo@example.com", "pw", Role::Employee);
        designer.department = Some("Design".to_string());
        let boss = User::new("Kim", "kim@example.com", "pw", Role::Manager);
        let users = vec![designer, boss];

        assert_eq!(filter_team(&users, "design").len(), 1);
        assert_eq!(filter_team(&users, "manager")[0].name, "Kim");
        assert_eq!(filter_team(&users, "").len(), 2);
    }
}
