//! Sort orders for task views.
//!
//! One enum covers the recognized orderings; each knows both the SQL
//! `ORDER BY` body the gateway uses and the equivalent in-memory
//! comparator. Unknown names fall back to `Date` rather than failing.

use std::cmp::Ordering;

use crate::types::Task;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SortOrder {
    /// Ascending due instant, tasks without one last.
    Date,
    /// Ascending priority rank: high, medium, low.
    Priority,
    /// Ascending category identifier, uncategorized last.
    Category,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Date
    }
}

impl SortOrder {
    /// Resolve a strategy name. Unknown names fall back to `Date`.
    pub fn resolve(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "date" => SortOrder::Date,
            "priority" => SortOrder::Priority,
            "category" => SortOrder::Category,
            other => {
                tracing::warn!("unknown sort order '{other}'; falling back to date");
                SortOrder::Date
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SortOrder::Date => "date",
            SortOrder::Priority => "priority",
            SortOrder::Category => "category",
        }
    }

    /// `ORDER BY` body for gateway queries over the tasks table. Columns are
    /// qualified so the clause also works in the category join.
    pub(crate) fn order_clause(self) -> &'static str {
        match self {
            SortOrder::Date => "tasks.due_at IS NULL, tasks.due_at ASC, tasks.id ASC",
            SortOrder::Priority => "tasks.priority ASC, tasks.id ASC",
            SortOrder::Category => {
                "tasks.category_id IS NULL, tasks.category_id ASC, tasks.id ASC"
            }
        }
    }

    /// In-memory comparator matching `order_clause`.
    pub fn compare(self, a: &Task, b: &Task) -> Ordering {
        let primary = match self {
            SortOrder::Date => match (a.due_at, b.due_at) {
                (Some(left), Some(right)) => left.cmp(&right),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
            SortOrder::Priority => a.priority.rank().cmp(&b.priority.rank()),
            SortOrder::Category => match (a.category_id, b.category_id) {
                (Some(left), Some(right)) => left.cmp(&right),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::types::{KIND_REGULAR, Priority};

    fn task(id: i64) -> Task {
        Task {
            id,
            title: format!("task {id}"),
            description: None,
            due_at: None,
            priority: Priority::Medium,
            category_id: None,
            completed: false,
            kind: KIND_REGULAR.to_string(),
        }
    }

    #[test]
    fn test_resolve_known_names() {
        assert_eq!(SortOrder::resolve("date"), SortOrder::Date);
        assert_eq!(SortOrder::resolve("PRIORITY"), SortOrder::Priority);
        assert_eq!(SortOrder::resolve(" category "), SortOrder::Category);
    }

    #[test]
    fn test_resolve_unknown_name_falls_back_to_date() {
        assert_eq!(SortOrder::resolve("bogus"), SortOrder::Date);
        assert_eq!(SortOrder::resolve(""), SortOrder::Date);
    }

    #[test]
    fn test_date_order_sorts_missing_due_last() {
        let now = Utc::now();
        let mut early = task(1);
        early.due_at = Some(now);
        let mut late = task(2);
        late.due_at = Some(now + Duration::hours(1));
        let undated = task(3);

        let mut tasks = vec![undated.clone(), late.clone(), early.clone()];
        tasks.sort_by(|a, b| SortOrder::Date.compare(a, b));

        assert_eq!(tasks[0].id, early.id);
        assert_eq!(tasks[1].id, late.id);
        assert_eq!(tasks[2].id, undated.id);
    }

    #[test]
    fn test_priority_order_ranks_high_first() {
        let mut high = task(1);
        high.priority = Priority::High;
        let mut low = task(2);
        low.priority = Priority::Low;
        let mut medium = task(3);
        medium.priority = Priority::Medium;

        let mut tasks = vec![low.clone(), medium.clone(), high.clone()];
        tasks.sort_by(|a, b| SortOrder::Priority.compare(a, b));

        assert_eq!(tasks[0].id, high.id);
        assert_eq!(tasks[1].id, medium.id);
        assert_eq!(tasks[2].id, low.id);
    }

    #[test]
    fn test_category_order_sorts_uncategorized_last() {
        let mut first = task(1);
        first.category_id = Some(1);
        let mut second = task(2);
        second.category_id = Some(5);
        let loose = task(3);

        let mut tasks = vec![loose.clone(), second.clone(), first.clone()];
        tasks.sort_by(|a, b| SortOrder::Category.compare(a, b));

        assert_eq!(tasks[0].id, first.id);
        assert_eq!(tasks[1].id, second.id);
        assert_eq!(tasks[2].id, loose.id);
    }

    #[test]
    fn test_ties_break_by_id() {
        let a = task(9);
        let b = task(4);
        assert_eq!(SortOrder::Date.compare(&b, &a), Ordering::Less);
    }
}
