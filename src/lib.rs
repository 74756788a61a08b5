//! Reactive task store.
//!
//! The store keeps an in-memory mirror of task entities in sync with a
//! durable SQLite-backed gateway, serializes every mutation through a single
//! write path, fans mutation events out to subscribers, and exposes
//! observable sort/filter views plus a multi-select working set.
//!
//! ```no_run
//! use taskflow::{SqliteGateway, TaskDraft, TaskStore};
//!
//! # fn main() -> anyhow::Result<()> {
//! let store = TaskStore::new(SqliteGateway::open("tasks.sqlite")?)?;
//! let id = store.insert(TaskDraft::new("Pay rent")).blocking_wait()?;
//! assert!(store.pending_view().snapshot().iter().any(|p| p.task.id == id));
//! # Ok(())
//! # }
//! ```

pub mod color;
pub mod config;
pub mod db;
pub mod derived;
pub mod error;
pub mod logging;
pub mod notifier;
pub mod ordering;
mod selection;
pub mod store;
pub mod types;
pub mod view;

pub use color::{CATEGORY_COLOR_PALETTE, ColorPicker, CyclingColorPicker, RandomColorPicker};
pub use config::StoreConfig;
pub use db::{SqliteGateway, TaskGateway};
pub use error::{Result, StoreError};
pub use notifier::{ChangeNotifier, SubscriptionId, TaskEvent};
pub use ordering::SortOrder;
pub use store::{CategoryDeletePolicy, TaskStore, Ticket};
pub use types::{
    Category, CategoryDraft, KIND_PROJECT, KIND_REGULAR, Priority, StatusFilter, Task, TaskDraft,
    TaskProjection,
};
pub use view::{CountWindow, DueCountView, ProjectionView, View};
