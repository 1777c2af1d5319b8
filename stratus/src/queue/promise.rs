//! Single-resolution result handle for queued work
//!
//! A [`Promise`] moves forward only:
//!
//! ```text
//! Pending ──should_start──▶ Started ──complete──▶ Completed
//!    │                                               ▲
//!    ├──cancel──▶ Cancelled                          │
//!    └──────────────────complete─────────────────────┘
//! ```
//!
//! Every transition goes through one `watch` channel, so a transition and
//! the check that allows it happen atomically. Whichever of `complete`,
//! `complete_with_exception` or `cancel` lands first wins; the others return
//! `false` and change nothing.

use crate::queue::error::PromiseError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Where a promise is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromisePhase {
    Pending,
    Started,
    Cancelled,
    Completed,
}

#[derive(Debug, Clone)]
enum State<T> {
    Pending,
    Started,
    Cancelled,
    Completed(Result<T, PromiseError>),
}

impl<T: Clone> State<T> {
    fn phase(&self) -> PromisePhase {
        match self {
            State::Pending => PromisePhase::Pending,
            State::Started => PromisePhase::Started,
            State::Cancelled => PromisePhase::Cancelled,
            State::Completed(_) => PromisePhase::Completed,
        }
    }

    fn outcome(&self) -> Option<Result<T, PromiseError>> {
        match self {
            State::Pending | State::Started => None,
            State::Cancelled => Some(Err(PromiseError::CancelledBeforeStart)),
            State::Completed(result) => Some(result.clone()),
        }
    }
}

/// Handle on the eventual result of one unit of work.
///
/// Cheap to clone; all clones observe the same outcome.
#[derive(Debug)]
pub struct Promise<T> {
    state: Arc<watch::Sender<State<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone + Send + Sync> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> Promise<T> {
    pub fn new() -> Self {
        let (state, _) = watch::channel(State::Pending);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn phase(&self) -> PromisePhase {
        self.state.borrow().phase()
    }

    /// The outcome, if the promise is resolved
    pub fn try_outcome(&self) -> Option<Result<T, PromiseError>> {
        self.state.borrow().outcome()
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.phase(), PromisePhase::Cancelled | PromisePhase::Completed)
    }

    /// Claim the right to run the work: `Pending -> Started`.
    ///
    /// Returns `false` if the promise was cancelled, already started or
    /// already completed; the work must then not run.
    pub fn should_start(&self) -> bool {
        self.transition(|state| match state {
            State::Pending => Some(State::Started),
            _ => None,
        })
    }

    /// `Pending -> Cancelled`. Has no effect once the work has started.
    pub fn cancel(&self) -> bool {
        self.transition(|state| match state {
            State::Pending => Some(State::Cancelled),
            _ => None,
        })
    }

    /// Resolve with a value
    pub fn complete(&self, value: T) -> bool {
        self.resolve(Ok(value))
    }

    /// Resolve with the work's error
    pub fn complete_with_exception(&self, error: anyhow::Error) -> bool {
        self.resolve(Err(PromiseError::WorkFailed(Arc::new(error))))
    }

    /// Resolve as abandoned if nothing else resolved it
    pub(crate) fn abandon(&self) -> bool {
        self.resolve(Err(PromiseError::Abandoned))
    }

    fn resolve(&self, result: Result<T, PromiseError>) -> bool {
        self.transition(|state| match state {
            State::Pending | State::Started => Some(State::Completed(result)),
            _ => None,
        })
    }

    fn transition(&self, next: impl FnOnce(&State<T>) -> Option<State<T>>) -> bool {
        self.state.send_if_modified(|state| match next(state) {
            Some(new_state) => {
                *state = new_state;
                true
            }
            None => false,
        })
    }

    /// Wait for the outcome without a deadline
    pub async fn wait(&self) -> Result<T, PromiseError> {
        let mut rx = self.state.subscribe();
        let outcome = match rx.wait_for(|state| state.outcome().is_some()).await {
            Ok(state) => state.outcome(),
            Err(_) => None,
        };
        outcome.unwrap_or(Err(PromiseError::Abandoned))
    }

    /// Wait for the outcome for at most `timeout`.
    ///
    /// On timeout the promise is cancelled, which only takes effect if the
    /// work has not started yet, and [`PromiseError::Timeout`] is returned.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<T, PromiseError> {
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.cancel();
                Err(PromiseError::Timeout)
            }
        }
    }

    /// Wait until the work starts (or the promise resolves without starting).
    ///
    /// If it has not started within `timeout` the promise is cancelled and
    /// [`PromiseError::NotStartedInTime`] is returned. Losing that race to
    /// the worker counts as started.
    pub async fn wait_started(&self, timeout: Duration) -> Result<(), PromiseError> {
        let mut rx = self.state.subscribe();
        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|state| !matches!(state, State::Pending)),
        )
        .await;

        match waited {
            Ok(Ok(state)) => match &*state {
                State::Cancelled => Err(PromiseError::CancelledBeforeStart),
                _ => Ok(()),
            },
            Ok(Err(_)) => Err(PromiseError::Abandoned),
            Err(_) => {
                if self.cancel() {
                    Err(PromiseError::NotStartedInTime(timeout))
                } else if self.phase() == PromisePhase::Cancelled {
                    Err(PromiseError::CancelledBeforeStart)
                } else {
                    Ok(())
                }
            }
        }
    }
}
