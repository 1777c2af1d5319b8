//! Partitioned request queue
//!
//! Every partition (typically one cloud account) owns a FIFO backlog and a
//! pool of at most `workers_for(partition)` worker tasks draining it, so
//! requests start in submission order and never more than the budget run at
//! once. Workers are spawned on demand and exit when the backlog runs dry.
//! Waiting requests are bounded per partition; past `max_backlog`,
//! submissions fail immediately with [`QueueError::QueueSaturated`].
//! Cancelled requests give their backlog slot back.

use crate::error::{Result, StratusError};
use crate::queue::config::QueueConfig;
use crate::queue::error::{QueueError, QueueResult};
use crate::queue::metrics::{NoopQueueMetrics, PartitionState, PartitionStats, QueueMetrics};
use crate::queue::pooled::{Execution, PooledRequest, Queued};
use crate::queue::promise::Promise;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Default)]
struct Backlog {
    requests: VecDeque<Box<dyn Queued>>,
    /// Worker tasks currently draining `requests`
    active_workers: usize,
}

impl Backlog {
    /// Drop requests cancelled while waiting; returns how many were dropped
    fn purge_settled(&mut self) -> usize {
        let before = self.requests.len();
        self.requests.retain(|request| !request.is_settled());
        before - self.requests.len()
    }

    fn waiting(&self) -> usize {
        self.requests.iter().filter(|request| !request.is_settled()).count()
    }
}

struct Partition {
    name: String,
    workers: usize,
    backlog: Mutex<Backlog>,
    in_flight: AtomicUsize,
    submitted: AtomicU64,
    completed: AtomicU64,
    skipped: AtomicU64,
    rejected: AtomicU64,
    dequeued: AtomicU64,
    total_wait_micros: AtomicU64,
}

impl Partition {
    fn new(name: &str, workers: usize) -> Self {
        Self {
            name: name.to_string(),
            workers,
            backlog: Mutex::new(Backlog::default()),
            in_flight: AtomicUsize::new(0),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            total_wait_micros: AtomicU64::new(0),
        }
    }

    fn backlog(&self) -> MutexGuard<'_, Backlog> {
        self.backlog.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a request unless `limit` requests are already waiting.
    ///
    /// Returns whether a new worker must be spawned for it, or `None` if the
    /// backlog is full.
    fn enqueue(&self, request: Box<dyn Queued>, limit: usize, metrics: &dyn QueueMetrics) -> Option<bool> {
        let mut backlog = self.backlog();

        if backlog.requests.len() >= limit {
            let purged = backlog.purge_settled();
            if purged > 0 {
                debug!("Dropped {} cancelled requests from '{}'", purged, self.name);
                self.skipped.fetch_add(purged as u64, Ordering::Relaxed);
                for _ in 0..purged {
                    metrics.skipped(&self.name);
                }
            }
            if backlog.requests.len() >= limit {
                return None;
            }
        }

        backlog.requests.push_back(request);
        if backlog.active_workers < self.workers {
            backlog.active_workers += 1;
            Some(true)
        } else {
            Some(false)
        }
    }

    /// Next request for a worker; a worker that gets `None` must exit
    fn next_request(&self) -> Option<Box<dyn Queued>> {
        let mut backlog = self.backlog();
        let next = backlog.requests.pop_front();
        if next.is_none() {
            backlog.active_workers -= 1;
        }
        next
    }

    fn is_idle(&self) -> bool {
        let backlog = self.backlog();
        backlog.requests.is_empty()
            && backlog.active_workers == 0
            && self.in_flight.load(Ordering::Acquire) == 0
    }

    fn record_wait(&self, wait: Duration) {
        self.dequeued.fetch_add(1, Ordering::Relaxed);
        self.total_wait_micros
            .fetch_add(u64::try_from(wait.as_micros()).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    fn stats(&self) -> PartitionStats {
        let in_flight = self.in_flight.load(Ordering::Acquire);
        let backlog = self.backlog().waiting();
        let dequeued = self.dequeued.load(Ordering::Relaxed);

        let state = if in_flight == 0 && backlog == 0 {
            PartitionState::Idle
        } else {
            PartitionState::Running { in_flight, backlog }
        };
        let average_wait = match dequeued {
            0 => Duration::ZERO,
            n => Duration::from_micros(self.total_wait_micros.load(Ordering::Relaxed) / n),
        };

        PartitionStats {
            partition: self.name.clone(),
            workers: self.workers,
            state,
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            average_wait,
        }
    }
}

/// Worker loop: run queued requests in order until the backlog is empty
async fn drain(partition: Arc<Partition>, metrics: Arc<dyn QueueMetrics>) {
    while let Some(request) = partition.next_request() {
        partition.record_wait(request.queued_for());

        let running = partition.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        metrics.in_flight(&partition.name, running);

        match request.run(Arc::clone(&metrics)).await {
            Execution::Ran => partition.completed.fetch_add(1, Ordering::Relaxed),
            Execution::Skipped => partition.skipped.fetch_add(1, Ordering::Relaxed),
        };

        let running = partition.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
        metrics.in_flight(&partition.name, running);
    }
}

/// Bounded-concurrency executor for remote calls, keyed by partition
///
/// Partitions are created on first use and kept, with their counters, for
/// the lifetime of the queue. Deployments that cycle through many short-lived
/// accounts can call [`RequestQueue::remove_idle_partitions`] periodically.
pub struct RequestQueue {
    config: QueueConfig,
    partitions: RwLock<HashMap<String, Arc<Partition>>>,
    metrics: Arc<dyn QueueMetrics>,
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RequestQueue {
    pub fn new(config: QueueConfig) -> Result<Self> {
        config.validate().map_err(StratusError::InvalidConfig)?;

        info!(
            "Request queue initialized (default workers: {}, max backlog: {})",
            config.default_workers, config.max_backlog
        );

        Ok(Self {
            config,
            partitions: RwLock::new(HashMap::new()),
            metrics: Arc::new(NoopQueueMetrics),
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn QueueMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn partition(&self, name: &str) -> Arc<Partition> {
        if let Some(partition) = self
            .partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Arc::clone(partition);
        }

        let mut partitions = self.partitions.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(partitions.entry(name.to_string()).or_insert_with(|| {
            debug!("Creating partition '{}'", name);
            Arc::new(Partition::new(name, self.config.workers_for(name)))
        }))
    }

    /// Queue `work` on `partition` and return its promise.
    ///
    /// Never waits: the request is either queued or rejected right away.
    /// Must be called from within a tokio runtime.
    pub fn submit<T, F, Fut>(&self, partition: &str, work: F) -> QueueResult<Promise<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let state = self.partition(partition);
        let request = PooledRequest::new(partition, work);
        let promise = request.promise();

        let Some(spawn_worker) =
            state.enqueue(Box::new(request), self.config.max_backlog, self.metrics.as_ref())
        else {
            state.rejected.fetch_add(1, Ordering::Relaxed);
            self.metrics.rejected(partition);
            warn!(
                "Rejecting request for '{}': {} requests already waiting",
                partition, self.config.max_backlog
            );
            return Err(QueueError::QueueSaturated {
                partition: partition.to_string(),
                limit: self.config.max_backlog,
            });
        };
        state.submitted.fetch_add(1, Ordering::Relaxed);

        if spawn_worker {
            tokio::spawn(drain(state, Arc::clone(&self.metrics)));
        }

        Ok(promise)
    }

    /// Submit `work` and wait for its result.
    ///
    /// Gives up with [`PromiseError::NotStartedInTime`](crate::queue::PromiseError::NotStartedInTime)
    /// if no worker picks the request up within `start_work_timeout`; the
    /// request is then cancelled and will not run. Once started, waits up to
    /// `timeout` for the result.
    pub async fn execute<T, F, Fut>(&self, partition: &str, work: F) -> QueueResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let promise = self.submit(partition, work)?;
        promise.wait_started(self.config.start_work_timeout).await?;
        Ok(promise.wait_timeout(self.config.timeout).await?)
    }

    /// Snapshot of a partition; `None` if nothing was ever submitted to it
    pub fn partition_stats(&self, partition: &str) -> Option<PartitionStats> {
        self.partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(partition)
            .map(|p| p.stats())
    }

    /// Snapshots of every known partition, sorted by name
    pub fn all_partition_stats(&self) -> Vec<PartitionStats> {
        let mut stats: Vec<PartitionStats> = self
            .partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|p| p.stats())
            .collect();
        stats.sort_by(|a, b| a.partition.cmp(&b.partition));
        stats
    }

    /// Forget partitions that have no work and no configured budget.
    ///
    /// Their statistics are dropped; a later submission starts them afresh.
    /// A submission racing with the removal still runs, but is not counted.
    pub fn remove_idle_partitions(&self) -> usize {
        let mut partitions = self.partitions.write().unwrap_or_else(PoisonError::into_inner);
        let before = partitions.len();
        partitions.retain(|name, partition| {
            self.config.partition_workers.contains_key(name) || !partition.is_idle()
        });
        let removed = before - partitions.len();
        if removed > 0 {
            debug!("Removed {} idle partitions", removed);
        }
        removed
    }
}
