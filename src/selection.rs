//! Multi-select working set over the mirrored tasks.
//!
//! The state lives on the write path; everyone else sees watch-published
//! snapshots. Pruning on delete happens in the same write-path step as the
//! delete notification, so the set never references a dead entity.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::watch;

pub(crate) struct SelectionState {
    selected: BTreeSet<i64>,
    snapshot_tx: watch::Sender<Arc<BTreeSet<i64>>>,
    active_tx: watch::Sender<bool>,
}

impl SelectionState {
    pub fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(BTreeSet::new()));
        let (active_tx, _) = watch::channel(false);
        Self {
            selected: BTreeSet::new(),
            snapshot_tx,
            active_tx,
        }
    }

    pub fn snapshot_rx(&self) -> watch::Receiver<Arc<BTreeSet<i64>>> {
        self.snapshot_tx.subscribe()
    }

    pub fn active_rx(&self) -> watch::Receiver<bool> {
        self.active_tx.subscribe()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.selected.contains(&id)
    }

    /// Flip membership; returns the new state. Toggle twice is a no-op.
    pub fn toggle(&mut self, id: i64) -> bool {
        let now_selected = if self.selected.remove(&id) {
            false
        } else {
            self.selected.insert(id);
            true
        };
        self.publish();
        now_selected
    }

    /// Prune a deleted identifier; returns whether it was present.
    pub fn remove(&mut self, id: i64) -> bool {
        let removed = self.selected.remove(&id);
        if removed {
            self.publish();
        }
        removed
    }

    pub fn clear(&mut self) {
        if !self.selected.is_empty() {
            self.selected.clear();
            self.publish();
        }
    }

    fn publish(&self) {
        let _ = self.snapshot_tx.send(Arc::new(self.selected.clone()));
        let _ = self.active_tx.send(!self.selected.is_empty());
    }
}
