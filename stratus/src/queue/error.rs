//! Queue and promise errors

use std::sync::Arc;
use thiserror::Error;

/// Why a promise resolved without a value.
///
/// Cloned out to every awaiter of the same promise, so the work's own error
/// is shared behind an `Arc`.
#[derive(Error, Debug, Clone)]
pub enum PromiseError {
    /// The work ran and returned an error (or panicked)
    #[error("Work failed: {0:#}")]
    WorkFailed(Arc<anyhow::Error>),

    /// Cancelled while still queued; the work never ran
    #[error("Cancelled before the work started")]
    CancelledBeforeStart,

    /// Did not start within the start-work timeout and was cancelled
    #[error("Work did not start within {0:?}")]
    NotStartedInTime(std::time::Duration),

    /// The awaiter gave up waiting
    #[error("Timed out waiting for the result")]
    Timeout,

    /// The request was dropped without resolving, e.g. on runtime shutdown
    #[error("Request was abandoned before completing")]
    Abandoned,
}

impl PromiseError {
    /// Whether the work is known not to have run
    pub fn never_ran(&self) -> bool {
        matches!(
            self,
            PromiseError::CancelledBeforeStart | PromiseError::NotStartedInTime(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum QueueError {
    /// The partition's backlog is full; nothing was queued
    #[error("Partition '{partition}' is saturated ({limit} requests waiting)")]
    QueueSaturated { partition: String, limit: usize },

    /// The request was queued but did not produce a value
    #[error(transparent)]
    Request(#[from] PromiseError),
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;
