//! Typed publish/subscribe hub for task mutations.
//!
//! The notifier owns the in-memory mirror of all known tasks and fans each
//! mutation event out to subscribers. Fan-out is synchronous and runs on the
//! write path, after the gateway has reported success, so subscribers always
//! observe mutations in submission order. The mirror is only ever mutated by
//! the store's worker.

use std::panic::{AssertUnwindSafe, catch_unwind};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::derived;
use crate::types::Task;

#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Added(Task),
    Updated(Task),
    Deleted(Task),
    Completed(Task),
}

impl TaskEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TaskEvent::Added(_) => "added",
            TaskEvent::Updated(_) => "updated",
            TaskEvent::Deleted(_) => "deleted",
            TaskEvent::Completed(_) => "completed",
        }
    }

    pub fn task(&self) -> &Task {
        match self {
            TaskEvent::Added(task)
            | TaskEvent::Updated(task)
            | TaskEvent::Deleted(task)
            | TaskEvent::Completed(task) => task,
        }
    }
}

/// Handle returned by `subscribe`. Delivery stops only on an explicit
/// `unsubscribe` call; there is no automatic lifecycle-driven release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn Fn(&TaskEvent) + Send>;

pub struct ChangeNotifier {
    mirror: Vec<Task>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self {
            mirror: Vec::new(),
            subscribers: Vec::new(),
            next_subscription: 1,
        }
    }

    pub fn subscribe(&mut self, callback: impl Fn(&TaskEvent) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Snapshot of the mirror; never the live list.
    pub fn mirror_snapshot(&self) -> Vec<Task> {
        self.mirror.clone()
    }

    pub(crate) fn mirror(&self) -> &[Task] {
        &self.mirror
    }

    /// Replace the mirror with a fresh authoritative list.
    pub fn replace_mirror(&mut self, tasks: Vec<Task>) {
        self.mirror = tasks;
    }

    pub fn notify_added(&mut self, task: Task) {
        debug!(task_id = task.id, title = %task.title, "task added");
        self.mirror.push(task.clone());
        self.fan_out(TaskEvent::Added(task));
    }

    pub fn notify_updated(&mut self, task: Task) {
        debug!(task_id = task.id, title = %task.title, "task updated");
        match self.mirror.iter_mut().find(|entry| entry.id == task.id) {
            Some(entry) => *entry = task.clone(),
            None => warn!(
                task_id = task.id,
                "update notification for a task absent from the mirror"
            ),
        }
        self.fan_out(TaskEvent::Updated(task));
    }

    pub fn notify_deleted(&mut self, task: Task) {
        debug!(task_id = task.id, title = %task.title, "task deleted");
        let before = self.mirror.len();
        self.mirror.retain(|entry| entry.id != task.id);
        if self.mirror.len() == before {
            warn!(
                task_id = task.id,
                "delete notification for a task absent from the mirror"
            );
        }
        self.fan_out(TaskEvent::Deleted(task));
    }

    pub fn notify_completed(&mut self, task: Task) {
        debug!(task_id = task.id, title = %task.title, "task completed");
        match self.mirror.iter_mut().find(|entry| entry.id == task.id) {
            Some(entry) => entry.completed = true,
            None => warn!(
                task_id = task.id,
                "completion notification for a task absent from the mirror"
            ),
        }
        self.fan_out(TaskEvent::Completed(task));
    }

    /// Mirror-side counterpart of the gateway's bulk reference clear. No
    /// fan-out: the bulk clear is part of a category deletion, not a task
    /// mutation in its own right.
    pub(crate) fn clear_category_refs(&mut self, category_id: i64) -> usize {
        let mut cleared = 0;
        for task in &mut self.mirror {
            if task.category_id == Some(category_id) {
                task.category_id = None;
                cleared += 1;
            }
        }
        cleared
    }

    /// Pending mirror tasks due within the next 24 hours.
    pub fn upcoming_count(&self, now: DateTime<Utc>) -> usize {
        derived::upcoming_count(&self.mirror, now)
    }

    /// Deliver to every subscriber in subscription order. A panicking
    /// subscriber must not starve the ones after it.
    fn fan_out(&self, event: TaskEvent) {
        for (id, subscriber) in &self.subscribers {
            if catch_unwind(AssertUnwindSafe(|| subscriber(&event))).is_err() {
                warn!(
                    subscription = id.0,
                    event = event.kind(),
                    "subscriber panicked during fan-out"
                );
            }
        }
    }
}
