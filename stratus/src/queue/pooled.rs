//! One queued unit of work bound to its promise

use crate::queue::metrics::QueueMetrics;
use crate::queue::promise::Promise;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Deferred work; nothing runs until the request is started
pub type Work<T> = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<T>> + Send>;

/// What happened when a request reached a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// The work ran and the promise was resolved with its result
    Ran,
    /// The promise was already cancelled or resolved; the work was skipped
    Skipped,
}

pub struct PooledRequest<T: Clone + Send + Sync> {
    id: Uuid,
    partition: String,
    promise: Promise<T>,
    work: Option<Work<T>>,
    submitted_at: Instant,
}

impl<T: Clone + Send + Sync + 'static> PooledRequest<T> {
    pub fn new<F, Fut>(partition: impl Into<String>, work: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            id: Uuid::new_v4(),
            partition: partition.into(),
            promise: Promise::new(),
            work: Some(Box::new(move || work().boxed())),
            submitted_at: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn promise(&self) -> Promise<T> {
        self.promise.clone()
    }

    /// Run the work if the promise still allows it, and resolve the promise.
    ///
    /// Errors and panics from the work become [`PromiseError::WorkFailed`](crate::queue::PromiseError::WorkFailed).
    pub async fn execute(mut self, metrics: &dyn QueueMetrics) -> Execution {
        let wait = self.submitted_at.elapsed();
        metrics.queue_wait(&self.partition, wait);

        let work = match self.work.take() {
            Some(work) if self.promise.should_start() => work,
            _ => {
                debug!(
                    "Skipping request {} in '{}': no longer wanted",
                    self.id, self.partition
                );
                metrics.skipped(&self.partition);
                return Execution::Skipped;
            }
        };

        debug!(
            "Starting request {} in '{}' after {:?} queued",
            self.id, self.partition, wait
        );

        match AssertUnwindSafe(async move { work().await }).catch_unwind().await {
            Ok(Ok(value)) => {
                self.promise.complete(value);
            }
            Ok(Err(error)) => {
                self.promise.complete_with_exception(error);
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                self.promise
                    .complete_with_exception(anyhow::anyhow!("work panicked: {}", message));
            }
        }

        Execution::Ran
    }
}

/// A request with its result type erased, as held in a partition backlog
pub(crate) trait Queued: Send {
    /// Cancelled or otherwise resolved while waiting
    fn is_settled(&self) -> bool;

    fn queued_for(&self) -> Duration;

    fn run(self: Box<Self>, metrics: Arc<dyn QueueMetrics>) -> BoxFuture<'static, Execution>;
}

impl<T: Clone + Send + Sync + 'static> Queued for PooledRequest<T> {
    fn is_settled(&self) -> bool {
        self.promise.is_resolved()
    }

    fn queued_for(&self) -> Duration {
        self.submitted_at.elapsed()
    }

    fn run(self: Box<Self>, metrics: Arc<dyn QueueMetrics>) -> BoxFuture<'static, Execution> {
        async move { (*self).execute(metrics.as_ref()).await }.boxed()
    }
}

impl<T: Clone + Send + Sync> Drop for PooledRequest<T> {
    fn drop(&mut self) {
        // Dropped mid-flight or never scheduled
        if self.promise.abandon() {
            debug!("Request {} in '{}' abandoned", self.id, self.partition);
        }
    }
}
