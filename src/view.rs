//! Observable view handles.
//!
//! The store publishes immutable snapshots over `tokio::sync::watch`
//! channels; these handles are the read side. `get` returns the latest
//! snapshot, `changed` suspends until the next publication. Handles stay
//! usable after the store session ends — `changed` then resolves `false`
//! and `get` keeps returning the final snapshot.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::watch;

use crate::derived;
use crate::types::{StatusFilter, Task, TaskProjection};

#[derive(Debug, Clone)]
pub struct View<T> {
    rx: watch::Receiver<T>,
}

impl<T: Clone> View<T> {
    pub(crate) fn new(rx: watch::Receiver<T>) -> Self {
        Self { rx }
    }

    /// Latest published snapshot.
    pub fn get(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Wait for the next publication. Resolves `false` once the publishing
    /// store session has closed.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// Ordered task-with-category snapshots under a status filter. The filter
/// applies to the joined projection list, so a pending view never leaks
/// completed entities through the join.
#[derive(Debug, Clone)]
pub struct ProjectionView {
    inner: View<Arc<Vec<TaskProjection>>>,
    filter: StatusFilter,
}

impl ProjectionView {
    pub(crate) fn new(rx: watch::Receiver<Arc<Vec<TaskProjection>>>, filter: StatusFilter) -> Self {
        Self {
            inner: View::new(rx),
            filter,
        }
    }

    pub fn filter(&self) -> StatusFilter {
        self.filter
    }

    pub fn snapshot(&self) -> Vec<TaskProjection> {
        self.inner
            .get()
            .iter()
            .filter(|projection| self.filter.matches(&projection.task))
            .cloned()
            .collect()
    }

    pub async fn changed(&mut self) -> bool {
        self.inner.changed().await
    }
}

/// Which due-instant bucket a `DueCountView` counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountWindow {
    /// Strictly before now.
    Overdue,
    /// Within `[now, now + window]`.
    Within(Duration),
}

/// Count of pending tasks in a due-instant bucket. "Now" is sampled on
/// every `get`, never cached, so the same snapshot can age into different
/// counts.
#[derive(Debug, Clone)]
pub struct DueCountView {
    inner: View<Arc<Vec<TaskProjection>>>,
    window: CountWindow,
}

impl DueCountView {
    pub(crate) fn new(rx: watch::Receiver<Arc<Vec<TaskProjection>>>, window: CountWindow) -> Self {
        Self {
            inner: View::new(rx),
            window,
        }
    }

    pub fn get(&self) -> usize {
        let now = Utc::now();
        let snapshot = self.inner.get();
        let tasks: Vec<Task> = snapshot
            .iter()
            .map(|projection| projection.task.clone())
            .collect();
        match self.window {
            CountWindow::Overdue => derived::overdue_count(&tasks, now),
            CountWindow::Within(window) => derived::due_soon_count(&tasks, now, window),
        }
    }

    pub async fn changed(&mut self) -> bool {
        self.inner.changed().await
    }
}
