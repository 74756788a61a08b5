//! The task store orchestrator.
//!
//! `TaskStore` is the single entry point for mutations: every command is
//! submitted to the write-path worker and comes back as a `Ticket`, an
//! awaitable completion. Validation failures are rejected up front, before
//! anything is enqueued. Read views are observable snapshots composed from
//! the active sort order and a status filter.

mod worker;

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::thread::JoinHandle;

use chrono::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

pub use self::worker::CategoryDeletePolicy;
use self::worker::{Command, Worker};
use crate::color::{ColorPicker, RandomColorPicker};
use crate::config::StoreConfig;
use crate::db::TaskGateway;
use crate::error::{Result, StoreError};
use crate::notifier::{ChangeNotifier, SubscriptionId, TaskEvent};
use crate::ordering::SortOrder;
use crate::selection::SelectionState;
use crate::types::{
    Category, CategoryDraft, StatusFilter, Task, TaskDraft, TaskProjection,
};
use crate::view::{CountWindow, DueCountView, ProjectionView, View};

/// Awaitable completion of a submitted command. The command runs whether or
/// not the ticket is awaited; dropping it only abandons the result.
pub struct Ticket<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Ticket<T> {
    fn pending() -> (oneshot::Sender<Result<T>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    fn rejected(err: StoreError) -> Self {
        let (tx, ticket) = Self::pending();
        let _ = tx.send(Err(err));
        ticket
    }

    /// Block until the command completes. Must not be called from async
    /// context; use `.await` there instead.
    pub fn blocking_wait(self) -> Result<T> {
        match self.rx.blocking_recv() {
            Ok(result) => result,
            Err(_) => Err(StoreError::Closed),
        }
    }
}

impl<T> Future for Ticket<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(StoreError::Closed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

pub struct TaskStore {
    commands: Option<mpsc::UnboundedSender<Command>>,
    worker: Option<JoinHandle<()>>,
    notifier: Arc<Mutex<ChangeNotifier>>,
    default_filter: StatusFilter,
    ordering_rx: watch::Receiver<SortOrder>,
    projections_rx: watch::Receiver<Arc<Vec<TaskProjection>>>,
    categories_rx: watch::Receiver<Arc<Vec<Category>>>,
    selection_rx: watch::Receiver<Arc<BTreeSet<i64>>>,
    selection_active_rx: watch::Receiver<bool>,
}

impl TaskStore {
    /// Open a store session over the given gateway with default
    /// configuration and a random category color picker.
    pub fn new(gateway: impl TaskGateway + 'static) -> Result<Self> {
        Self::with_options(
            gateway,
            StoreConfig::default(),
            Box::new(RandomColorPicker::default()),
        )
    }

    pub fn with_options(
        gateway: impl TaskGateway + 'static,
        config: StoreConfig,
        picker: Box<dyn ColorPicker>,
    ) -> Result<Self> {
        let mut gateway: Box<dyn TaskGateway> = Box::new(gateway);
        let order = SortOrder::resolve(&config.ordering);
        let default_filter = StatusFilter::resolve(&config.filter);

        // Prime the mirror and the views before the worker takes over, so a
        // freshly opened store is immediately readable.
        let tasks = gateway.list_tasks(order).map_err(StoreError::gateway)?;
        let projections = gateway
            .list_projections(order)
            .map_err(StoreError::gateway)?;
        let categories = gateway.list_categories().map_err(StoreError::gateway)?;

        let mut notifier = ChangeNotifier::new();
        notifier.replace_mirror(tasks);
        let notifier = Arc::new(Mutex::new(notifier));

        let (ordering_tx, ordering_rx) = watch::channel(order);
        let (projections_tx, projections_rx) = watch::channel(Arc::new(projections));
        let (categories_tx, categories_rx) = watch::channel(Arc::new(categories));

        let selection = SelectionState::new();
        let selection_rx = selection.snapshot_rx();
        let selection_active_rx = selection.active_rx();

        let worker = Worker {
            gateway,
            notifier: Arc::clone(&notifier),
            selection,
            picker,
            order,
            ordering_tx,
            projections_tx,
            categories_tx,
        };

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let handle = std::thread::Builder::new()
            .name("taskflow-store".to_string())
            .spawn(move || worker.run(commands_rx))
            .map_err(|err| StoreError::gateway(anyhow::Error::new(err).context("failed to spawn store worker")))?;

        debug!(
            order = order.name(),
            filter = default_filter.as_str(),
            "task store session opened"
        );

        Ok(Self {
            commands: Some(commands_tx),
            worker: Some(handle),
            notifier,
            default_filter,
            ordering_rx,
            projections_rx,
            categories_rx,
            selection_rx,
            selection_active_rx,
        })
    }

    fn submit<T>(&self, make: impl FnOnce(oneshot::Sender<Result<T>>) -> Command) -> Ticket<T> {
        let Some(commands) = self.commands.as_ref() else {
            return Ticket::rejected(StoreError::Closed);
        };
        let (tx, ticket) = Ticket::pending();
        // A failed send drops the command (and its reply sender) with it,
        // which resolves the ticket as Closed.
        let _ = commands.send(make(tx));
        ticket
    }

    fn notifier(&self) -> MutexGuard<'_, ChangeNotifier> {
        self.notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ---- task commands ----

    /// Insert a new task. The ticket resolves to the assigned identifier;
    /// awaiting it is optional.
    pub fn insert(&self, draft: TaskDraft) -> Ticket<i64> {
        if draft.title.trim().is_empty() {
            return Ticket::rejected(StoreError::Validation(
                "task title must not be empty".to_string(),
            ));
        }
        let task = draft.into_task();
        self.submit(|reply| Command::InsertTask { task, reply })
    }

    /// Re-insert a previously deleted task, preserving its identifier.
    /// The undo counterpart of `delete`.
    pub fn restore(&self, task: &Task) -> Ticket<i64> {
        if task.title.trim().is_empty() {
            return Ticket::rejected(StoreError::Validation(
                "task title must not be empty".to_string(),
            ));
        }
        let task = task.clone();
        self.submit(|reply| Command::InsertTask { task, reply })
    }

    pub fn update(&self, task: &Task) -> Ticket<()> {
        if !task.is_saved() {
            return Ticket::rejected(StoreError::InvalidState(
                "cannot update a task without an assigned identifier".to_string(),
            ));
        }
        if task.title.trim().is_empty() {
            return Ticket::rejected(StoreError::Validation(
                "task title must not be empty".to_string(),
            ));
        }
        let task = task.clone();
        self.submit(|reply| Command::UpdateTask { task, reply })
    }

    pub fn delete(&self, task: &Task) -> Ticket<()> {
        if !task.is_saved() {
            return Ticket::rejected(StoreError::InvalidState(
                "cannot delete a task without an assigned identifier".to_string(),
            ));
        }
        let task = task.clone();
        self.submit(|reply| Command::DeleteTask { task, reply })
    }

    /// Batch delete. One gateway operation, one "deleted" notification per
    /// removed entity, all within a single unit of work.
    pub fn delete_many(&self, ids: Vec<i64>) -> Ticket<usize> {
        self.submit(|reply| Command::DeleteMany { ids, reply })
    }

    /// Mark completed. Fires "completed" rather than "updated"; calling it
    /// on an already-completed task yields the same observable state.
    pub fn complete(&self, task: &Task) -> Ticket<()> {
        if !task.is_saved() {
            return Ticket::rejected(StoreError::InvalidState(
                "cannot complete a task without an assigned identifier".to_string(),
            ));
        }
        let task = task.clone();
        self.submit(|reply| Command::CompleteTask { task, reply })
    }

    /// Flip the completion flag. Resolves to the new state; completing
    /// fires "completed", un-completing fires "updated".
    pub fn toggle_completion(&self, task: &Task) -> Ticket<bool> {
        if !task.is_saved() {
            return Ticket::rejected(StoreError::InvalidState(
                "cannot toggle a task without an assigned identifier".to_string(),
            ));
        }
        let task = task.clone();
        self.submit(|reply| Command::ToggleCompletion { task, reply })
    }

    /// Re-query the gateway and replace the mirror with the authoritative
    /// task list.
    pub fn refresh(&self) -> Ticket<()> {
        self.submit(|reply| Command::Refresh { reply })
    }

    // ---- ordering & views ----

    /// Switch the active sort order. Unknown names fall back to `date`.
    /// Takes effect on the next view recomputation.
    pub fn set_ordering(&self, name: &str) -> Ticket<()> {
        let order = SortOrder::resolve(name);
        self.submit(|reply| Command::SetOrdering { order, reply })
    }

    pub fn ordering(&self) -> SortOrder {
        *self.ordering_rx.borrow()
    }

    /// Observable projection view under the given status filter, ordered by
    /// the active sort order.
    pub fn all_view(&self, filter: StatusFilter) -> ProjectionView {
        ProjectionView::new(self.projections_rx.clone(), filter)
    }

    pub fn pending_view(&self) -> ProjectionView {
        self.all_view(StatusFilter::Pending)
    }

    pub fn completed_view(&self) -> ProjectionView {
        self.all_view(StatusFilter::Completed)
    }

    /// The view matching the configured default status filter.
    pub fn default_view(&self) -> ProjectionView {
        self.all_view(self.default_filter)
    }

    /// Count of pending tasks strictly overdue at read time.
    pub fn overdue_count(&self) -> DueCountView {
        DueCountView::new(self.projections_rx.clone(), CountWindow::Overdue)
    }

    /// Count of pending tasks due within `window` of read time.
    pub fn due_soon_count(&self, window: Duration) -> DueCountView {
        DueCountView::new(self.projections_rx.clone(), CountWindow::Within(window))
    }

    /// Count of pending tasks due within the next 24 hours.
    pub fn upcoming_count(&self) -> DueCountView {
        self.due_soon_count(Duration::hours(24))
    }

    /// Snapshot of the mirror. Never the live list.
    pub fn tasks_snapshot(&self) -> Vec<Task> {
        self.notifier().mirror_snapshot()
    }

    // ---- fenced reads ----

    pub fn task(&self, id: i64) -> Ticket<Option<Task>> {
        self.submit(|reply| Command::TaskById { id, reply })
    }

    pub fn tasks_in_category(&self, category_id: i64) -> Ticket<Vec<Task>> {
        self.submit(|reply| Command::TasksInCategory { category_id, reply })
    }

    pub fn tasks_of_kind(&self, kind: impl Into<String>) -> Ticket<Vec<Task>> {
        let kind = kind.into();
        self.submit(|reply| Command::TasksOfKind { kind, reply })
    }

    // ---- categories ----

    pub fn insert_category(&self, draft: CategoryDraft) -> Ticket<i64> {
        if draft.name.trim().is_empty() {
            return Ticket::rejected(StoreError::Validation(
                "category name must not be empty".to_string(),
            ));
        }
        self.submit(|reply| Command::InsertCategory { draft, reply })
    }

    pub fn update_category(&self, category: &Category) -> Ticket<()> {
        if !category.is_saved() {
            return Ticket::rejected(StoreError::InvalidState(
                "cannot update a category without an assigned identifier".to_string(),
            ));
        }
        if category.name.trim().is_empty() {
            return Ticket::rejected(StoreError::Validation(
                "category name must not be empty".to_string(),
            ));
        }
        let category = category.clone();
        self.submit(|reply| Command::UpdateCategory { category, reply })
    }

    /// Delete a category with no dependent tasks. Resolves to
    /// `DecisionRequired` when dependents exist; the caller must then pick
    /// `delete_category_keep_tasks` or `delete_category_and_tasks`.
    pub fn delete_category(&self, category: &Category) -> Ticket<()> {
        self.delete_category_with_policy(category, None)
    }

    /// Delete a category, clearing the category reference on every
    /// dependent task.
    pub fn delete_category_keep_tasks(&self, category: &Category) -> Ticket<()> {
        self.delete_category_with_policy(category, Some(CategoryDeletePolicy::KeepTasks))
    }

    /// Delete a category along with every dependent task, firing one
    /// "deleted" notification per task.
    pub fn delete_category_and_tasks(&self, category: &Category) -> Ticket<()> {
        self.delete_category_with_policy(category, Some(CategoryDeletePolicy::DeleteTasks))
    }

    fn delete_category_with_policy(
        &self,
        category: &Category,
        policy: Option<CategoryDeletePolicy>,
    ) -> Ticket<()> {
        if !category.is_saved() {
            return Ticket::rejected(StoreError::InvalidState(
                "cannot delete a category without an assigned identifier".to_string(),
            ));
        }
        let category = category.clone();
        self.submit(|reply| Command::DeleteCategory {
            category,
            policy,
            reply,
        })
    }

    pub fn task_count_for_category(&self, category_id: i64) -> Ticket<usize> {
        self.submit(|reply| Command::CountTasksForCategory { category_id, reply })
    }

    pub fn can_delete_category(&self, category_id: i64) -> Ticket<bool> {
        self.submit(|reply| Command::CanDeleteCategory { category_id, reply })
    }

    /// Observable category list, ascending by name.
    pub fn categories_view(&self) -> View<Arc<Vec<Category>>> {
        View::new(self.categories_rx.clone())
    }

    // ---- selection ----

    /// Toggle an identifier in the working set. Resolves to the new
    /// membership state; unknown identifiers are ignored and resolve false.
    pub fn toggle_selection(&self, id: i64) -> Ticket<bool> {
        self.submit(|reply| Command::ToggleSelection { id, reply })
    }

    pub fn clear_selection(&self) -> Ticket<()> {
        self.submit(|reply| Command::ClearSelection { reply })
    }

    pub fn is_selected(&self, id: i64) -> bool {
        self.selection_rx.borrow().contains(&id)
    }

    pub fn selection(&self) -> View<Arc<BTreeSet<i64>>> {
        View::new(self.selection_rx.clone())
    }

    /// True iff the working set is non-empty.
    pub fn selection_active(&self) -> View<bool> {
        View::new(self.selection_active_rx.clone())
    }

    // ---- notifications ----

    /// Register a mutation observer. Callbacks run synchronously on the
    /// write path, in subscription order; they must not call back into the
    /// store. Release with `unsubscribe`.
    pub fn subscribe(&self, callback: impl Fn(&TaskEvent) + Send + 'static) -> SubscriptionId {
        self.notifier().subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier().unsubscribe(id)
    }
}

impl Drop for TaskStore {
    fn drop(&mut self) {
        self.commands.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
