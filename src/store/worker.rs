//! The serialized write path.
//!
//! One worker thread drains the command channel in submission order. Every
//! gateway operation, every mirror mutation and every notification happens
//! here, so two commands can never interleave and a command's effects are
//! fully visible before the next one starts.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::color::ColorPicker;
use crate::db::TaskGateway;
use crate::error::{Result, StoreError};
use crate::notifier::ChangeNotifier;
use crate::ordering::SortOrder;
use crate::selection::SelectionState;
use crate::types::{Category, CategoryDraft, Task, TaskProjection};

/// What to do with dependent tasks when deleting their category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryDeletePolicy {
    /// Clear the category reference on dependents, keep the tasks.
    KeepTasks,
    /// Delete every dependent task along with the category.
    DeleteTasks,
}

pub(crate) enum Command {
    InsertTask {
        task: Task,
        reply: oneshot::Sender<Result<i64>>,
    },
    UpdateTask {
        task: Task,
        reply: oneshot::Sender<Result<()>>,
    },
    DeleteTask {
        task: Task,
        reply: oneshot::Sender<Result<()>>,
    },
    DeleteMany {
        ids: Vec<i64>,
        reply: oneshot::Sender<Result<usize>>,
    },
    CompleteTask {
        task: Task,
        reply: oneshot::Sender<Result<()>>,
    },
    ToggleCompletion {
        task: Task,
        reply: oneshot::Sender<Result<bool>>,
    },
    SetOrdering {
        order: SortOrder,
        reply: oneshot::Sender<Result<()>>,
    },
    Refresh {
        reply: oneshot::Sender<Result<()>>,
    },
    TaskById {
        id: i64,
        reply: oneshot::Sender<Result<Option<Task>>>,
    },
    TasksInCategory {
        category_id: i64,
        reply: oneshot::Sender<Result<Vec<Task>>>,
    },
    TasksOfKind {
        kind: String,
        reply: oneshot::Sender<Result<Vec<Task>>>,
    },
    InsertCategory {
        draft: CategoryDraft,
        reply: oneshot::Sender<Result<i64>>,
    },
    UpdateCategory {
        category: Category,
        reply: oneshot::Sender<Result<()>>,
    },
    DeleteCategory {
        category: Category,
        policy: Option<CategoryDeletePolicy>,
        reply: oneshot::Sender<Result<()>>,
    },
    CountTasksForCategory {
        category_id: i64,
        reply: oneshot::Sender<Result<usize>>,
    },
    CanDeleteCategory {
        category_id: i64,
        reply: oneshot::Sender<Result<bool>>,
    },
    ToggleSelection {
        id: i64,
        reply: oneshot::Sender<Result<bool>>,
    },
    ClearSelection {
        reply: oneshot::Sender<Result<()>>,
    },
}

pub(crate) struct Worker {
    pub(crate) gateway: Box<dyn TaskGateway>,
    pub(crate) notifier: Arc<Mutex<ChangeNotifier>>,
    pub(crate) selection: SelectionState,
    pub(crate) picker: Box<dyn ColorPicker>,
    pub(crate) order: SortOrder,
    pub(crate) ordering_tx: watch::Sender<SortOrder>,
    pub(crate) projections_tx: watch::Sender<Arc<Vec<TaskProjection>>>,
    pub(crate) categories_tx: watch::Sender<Arc<Vec<Category>>>,
}

impl Worker {
    pub(crate) fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        debug!("task store write path started");
        while let Some(command) = commands.blocking_recv() {
            self.handle(command);
        }
        debug!("task store write path stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::InsertTask { task, reply } => {
                let _ = reply.send(self.exec_insert(task));
            }
            Command::UpdateTask { task, reply } => {
                let _ = reply.send(self.exec_update(task));
            }
            Command::DeleteTask { task, reply } => {
                let _ = reply.send(self.exec_delete(task));
            }
            Command::DeleteMany { ids, reply } => {
                let _ = reply.send(self.exec_delete_many(ids));
            }
            Command::CompleteTask { task, reply } => {
                let _ = reply.send(self.exec_complete(task));
            }
            Command::ToggleCompletion { task, reply } => {
                let _ = reply.send(self.exec_toggle_completion(task));
            }
            Command::SetOrdering { order, reply } => {
                let _ = reply.send(self.exec_set_ordering(order));
            }
            Command::Refresh { reply } => {
                let _ = reply.send(self.exec_refresh());
            }
            Command::TaskById { id, reply } => {
                let _ = reply.send(self.gateway.task_by_id(id).map_err(StoreError::gateway));
            }
            Command::TasksInCategory { category_id, reply } => {
                let _ = reply.send(
                    self.gateway
                        .tasks_in_category(category_id)
                        .map_err(StoreError::gateway),
                );
            }
            Command::TasksOfKind { kind, reply } => {
                let _ = reply.send(
                    self.gateway
                        .tasks_of_kind(&kind)
                        .map_err(StoreError::gateway),
                );
            }
            Command::InsertCategory { draft, reply } => {
                let _ = reply.send(self.exec_insert_category(draft));
            }
            Command::UpdateCategory { category, reply } => {
                let _ = reply.send(self.exec_update_category(category));
            }
            Command::DeleteCategory {
                category,
                policy,
                reply,
            } => {
                let _ = reply.send(self.exec_delete_category(category, policy));
            }
            Command::CountTasksForCategory { category_id, reply } => {
                let _ = reply.send(
                    self.gateway
                        .count_tasks_for_category(category_id)
                        .map_err(StoreError::gateway),
                );
            }
            Command::CanDeleteCategory { category_id, reply } => {
                let _ = reply.send(
                    self.gateway
                        .count_tasks_for_category(category_id)
                        .map(|count| count == 0)
                        .map_err(StoreError::gateway),
                );
            }
            Command::ToggleSelection { id, reply } => {
                let _ = reply.send(self.exec_toggle_selection(id));
            }
            Command::ClearSelection { reply } => {
                self.selection.clear();
                let _ = reply.send(Ok(()));
            }
        }
    }

    fn check_category_ref(&mut self, category_id: Option<i64>) -> Result<()> {
        let Some(category_id) = category_id else {
            return Ok(());
        };
        let exists = self
            .gateway
            .category_by_id(category_id)
            .map_err(StoreError::gateway)?
            .is_some();
        if exists {
            Ok(())
        } else {
            Err(StoreError::Validation(format!(
                "category {category_id} does not exist"
            )))
        }
    }

    fn exec_insert(&mut self, task: Task) -> Result<i64> {
        self.check_category_ref(task.category_id)?;
        let id = self.gateway.insert_task(&task).map_err(StoreError::gateway)?;
        let mut saved = task;
        saved.id = id;
        lock_notifier(&self.notifier).notify_added(saved);
        self.publish_projections();
        Ok(id)
    }

    fn exec_update(&mut self, task: Task) -> Result<()> {
        self.check_category_ref(task.category_id)?;
        self.gateway.update_task(&task).map_err(StoreError::gateway)?;
        lock_notifier(&self.notifier).notify_updated(task);
        self.publish_projections();
        Ok(())
    }

    fn exec_delete(&mut self, task: Task) -> Result<()> {
        self.gateway
            .delete_task(task.id)
            .map_err(StoreError::gateway)?;
        let id = task.id;
        lock_notifier(&self.notifier).notify_deleted(task);
        self.selection.remove(id);
        self.publish_projections();
        Ok(())
    }

    fn exec_delete_many(&mut self, ids: Vec<i64>) -> Result<usize> {
        let mut victims = Vec::with_capacity(ids.len());
        for &id in &ids {
            if let Some(task) = self.gateway.task_by_id(id).map_err(StoreError::gateway)? {
                victims.push(task);
            }
        }

        let removed = self
            .gateway
            .delete_tasks(&ids)
            .map_err(StoreError::gateway)?;

        {
            let mut notifier = lock_notifier(&self.notifier);
            for task in victims {
                let id = task.id;
                notifier.notify_deleted(task);
                self.selection.remove(id);
            }
        }
        self.publish_projections();
        Ok(removed)
    }

    fn exec_complete(&mut self, mut task: Task) -> Result<()> {
        task.completed = true;
        self.gateway.update_task(&task).map_err(StoreError::gateway)?;
        lock_notifier(&self.notifier).notify_completed(task);
        self.publish_projections();
        Ok(())
    }

    fn exec_toggle_completion(&mut self, mut task: Task) -> Result<bool> {
        let now_completed = !task.completed;
        task.completed = now_completed;
        self.gateway.update_task(&task).map_err(StoreError::gateway)?;
        // Completing fires "completed"; un-completing fires "updated".
        // There is no "uncompleted" event kind.
        if now_completed {
            lock_notifier(&self.notifier).notify_completed(task);
        } else {
            lock_notifier(&self.notifier).notify_updated(task);
        }
        self.publish_projections();
        Ok(now_completed)
    }

    fn exec_set_ordering(&mut self, order: SortOrder) -> Result<()> {
        if self.order != order {
            debug!(order = order.name(), "switching sort order");
        }
        self.order = order;
        let _ = self.ordering_tx.send(order);
        self.publish_projections();
        Ok(())
    }

    fn exec_refresh(&mut self) -> Result<()> {
        let tasks = self
            .gateway
            .list_tasks(self.order)
            .map_err(StoreError::gateway)?;
        lock_notifier(&self.notifier).replace_mirror(tasks);
        self.publish_projections();
        self.publish_categories();
        Ok(())
    }

    fn exec_insert_category(&mut self, draft: CategoryDraft) -> Result<i64> {
        let color = draft.color.unwrap_or_else(|| self.picker.pick());
        let mut category = Category {
            id: 0,
            name: draft.name,
            color,
        };
        let id = self
            .gateway
            .insert_category(&category)
            .map_err(StoreError::gateway)?;
        category.id = id;
        self.publish_categories();
        Ok(id)
    }

    fn exec_update_category(&mut self, category: Category) -> Result<()> {
        self.gateway
            .update_category(&category)
            .map_err(StoreError::gateway)?;
        self.publish_categories();
        // Category names and colors are embedded in projections.
        self.publish_projections();
        Ok(())
    }

    /// Count check and deletion run as one unit of work, so no concurrently
    /// enqueued task mutation can invalidate the count in between.
    fn exec_delete_category(
        &mut self,
        category: Category,
        policy: Option<CategoryDeletePolicy>,
    ) -> Result<()> {
        let dependents = self
            .gateway
            .count_tasks_for_category(category.id)
            .map_err(StoreError::gateway)?;

        if dependents > 0 {
            match policy {
                None => return Err(StoreError::DecisionRequired { dependents }),
                Some(CategoryDeletePolicy::KeepTasks) => {
                    self.gateway
                        .clear_category_refs(category.id)
                        .map_err(StoreError::gateway)?;
                    lock_notifier(&self.notifier).clear_category_refs(category.id);
                }
                Some(CategoryDeletePolicy::DeleteTasks) => {
                    let victims = self
                        .gateway
                        .tasks_in_category(category.id)
                        .map_err(StoreError::gateway)?;
                    let ids: Vec<i64> = victims.iter().map(|task| task.id).collect();
                    self.gateway
                        .delete_tasks(&ids)
                        .map_err(StoreError::gateway)?;
                    let mut notifier = lock_notifier(&self.notifier);
                    for task in victims {
                        let id = task.id;
                        notifier.notify_deleted(task);
                        self.selection.remove(id);
                    }
                }
            }
        }

        self.gateway
            .delete_category(category.id)
            .map_err(StoreError::gateway)?;
        self.publish_categories();
        self.publish_projections();
        Ok(())
    }

    fn exec_toggle_selection(&mut self, id: i64) -> Result<bool> {
        // Toggling off never needs the entity to still exist.
        if self.selection.contains(id) {
            return Ok(self.selection.toggle(id));
        }
        let known = lock_notifier(&self.notifier)
            .mirror()
            .iter()
            .any(|task| task.id == id);
        if !known {
            warn!(task_id = id, "ignoring selection toggle for unknown task");
            return Ok(false);
        }
        Ok(self.selection.toggle(id))
    }

    fn publish_projections(&mut self) {
        match self.gateway.list_projections(self.order) {
            Ok(projections) => {
                let _ = self.projections_tx.send(Arc::new(projections));
            }
            Err(err) => warn!(error = %err, "failed to refresh projection view"),
        }
    }

    fn publish_categories(&mut self) {
        match self.gateway.list_categories() {
            Ok(categories) => {
                let _ = self.categories_tx.send(Arc::new(categories));
            }
            Err(err) => warn!(error = %err, "failed to refresh category view"),
        }
    }
}

/// Fan-out panics are caught inside the notifier, so a poisoned lock can
/// only mean a panic in the store's own bookkeeping; the state is still
/// coherent enough to continue.
fn lock_notifier(notifier: &Arc<Mutex<ChangeNotifier>>) -> MutexGuard<'_, ChangeNotifier> {
    notifier.lock().unwrap_or_else(PoisonError::into_inner)
}
