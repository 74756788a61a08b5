//! Error types for the task store.
//!
//! Validation and state errors are rejected before a command is enqueued;
//! gateway failures surface through the command's ticket after the write
//! path has run the operation. Notifications only fire on success, so a
//! failed command leaves the mirror and the selection set untouched.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The draft or entity failed validation; nothing was enqueued.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation requires a persisted entity; nothing was enqueued.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The persistence gateway failed. The command is not retried.
    #[error("persistence gateway failure: {0:#}")]
    Gateway(#[source] anyhow::Error),

    /// Category deletion with live dependents needs an explicit policy
    /// choice (`delete_category_keep_tasks` or `delete_category_and_tasks`).
    #[error("category has {dependents} dependent task(s); deletion decision required")]
    DecisionRequired { dependents: usize },

    /// The store session shut down before the command completed.
    #[error("task store session closed")]
    Closed,
}

impl StoreError {
    pub(crate) fn gateway(err: anyhow::Error) -> Self {
        StoreError::Gateway(err)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
