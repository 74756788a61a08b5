//! Pure derived counts over task lists.
//!
//! "Now" is always a parameter: callers sample it at evaluation time so
//! nothing here caches a clock reading.

use chrono::{DateTime, Duration, Utc};

use crate::types::Task;

/// Pending tasks whose due instant is strictly before `now`.
pub fn overdue_count(tasks: &[Task], now: DateTime<Utc>) -> usize {
    tasks
        .iter()
        .filter(|task| !task.completed)
        .filter(|task| task.due_at.is_some_and(|due| due < now))
        .count()
}

/// Pending tasks due within `[now, now + window]`.
pub fn due_soon_count(tasks: &[Task], now: DateTime<Utc>, window: Duration) -> usize {
    let horizon = now + window;
    tasks
        .iter()
        .filter(|task| !task.completed)
        .filter(|task| {
            task.due_at
                .is_some_and(|due| due >= now && due <= horizon)
        })
        .count()
}

/// Pending tasks due within the next 24 hours.
pub fn upcoming_count(tasks: &[Task], now: DateTime<Utc>) -> usize {
    due_soon_count(tasks, now, Duration::hours(24))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KIND_REGULAR, Priority};

    fn task(id: i64, due: Option<DateTime<Utc>>, completed: bool) -> Task {
        Task {
            id,
            title: format!("task {id}"),
            description: None,
            due_at: due,
            priority: Priority::Medium,
            category_id: None,
            completed,
            kind: KIND_REGULAR.to_string(),
        }
    }

    #[test]
    fn test_overdue_count_excludes_completed_and_undated() {
        let now = Utc::now();
        let tasks = vec![
            task(1, Some(now - Duration::hours(1)), false),
            task(2, Some(now - Duration::days(2)), true),
            task(3, None, false),
            task(4, Some(now + Duration::hours(1)), false),
        ];

        assert_eq!(overdue_count(&tasks, now), 1);
    }

    #[test]
    fn test_overdue_is_strictly_before_now() {
        let now = Utc::now();
        let tasks = vec![task(1, Some(now), false)];
        assert_eq!(overdue_count(&tasks, now), 0);
    }

    #[test]
    fn test_upcoming_count_window() {
        let now = Utc::now();
        let tasks = vec![
            task(1, Some(now + Duration::hours(2)), false),
            task(2, Some(now + Duration::hours(23)), false),
            task(3, Some(now + Duration::hours(25)), false),
            task(4, Some(now - Duration::hours(1)), false),
            task(5, Some(now + Duration::hours(3)), true),
        ];

        assert_eq!(upcoming_count(&tasks, now), 2);
    }

    #[test]
    fn test_due_soon_custom_window() {
        let now = Utc::now();
        let tasks = vec![
            task(1, Some(now + Duration::minutes(30)), false),
            task(2, Some(now + Duration::hours(2)), false),
        ];

        assert_eq!(due_soon_count(&tasks, now, Duration::hours(1)), 1);
    }
}
