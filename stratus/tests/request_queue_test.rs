//! Request Queue Tests
//!
//! Tests the queue and promise contract end to end:
//! - Per-partition concurrency bounds and FIFO start order
//! - Cancellation before start
//! - Single resolution of promises under races
//! - Metrics hooks

use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stratus::queue::{
    PartitionState, Promise, PromiseError, PromisePhase, QueueConfig, QueueMetrics, RequestQueue,
};
use tokio::sync::oneshot;
use tokio::time::Instant;

fn queue_with_workers(workers: usize) -> RequestQueue {
    RequestQueue::new(QueueConfig::builder().default_workers(workers).build()).unwrap()
}

/// Tracks how many units run at once
#[derive(Default)]
struct Concurrency {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Concurrency {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Concurrency Bound Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_partition_never_exceeds_worker_budget() -> Result<()> {
    let queue = queue_with_workers(3);
    let tracker = Arc::new(Concurrency::default());
    let spans = Arc::new(Mutex::new(Vec::new()));

    let mut promises = Vec::new();
    for unit in 0..20u64 {
        let tracker = tracker.clone();
        let spans = spans.clone();
        promises.push(queue.submit("acct-1", move || async move {
            tracker.enter();
            let start = Instant::now();
            tokio::time::sleep(Duration::from_millis(10 + unit % 3)).await;
            let end = Instant::now();
            tracker.exit();
            spans.lock().unwrap().push((start, end));
            Ok(unit)
        })?);
    }

    for (unit, promise) in promises.into_iter().enumerate() {
        assert_eq!(promise.wait().await?, unit as u64);
    }

    assert_eq!(tracker.peak.load(Ordering::SeqCst), 3);

    // Cross-check with the recorded timestamps: at no start instant are
    // more than three units running
    let spans = spans.lock().unwrap().clone();
    assert_eq!(spans.len(), 20);
    for (start, _) in &spans {
        let overlapping = spans
            .iter()
            .filter(|(s, e)| s <= start && start < e)
            .count();
        assert!(overlapping <= 3, "{overlapping} units running at once");
    }

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_partitions_have_independent_budgets() -> Result<()> {
    let queue = RequestQueue::new(
        QueueConfig::builder()
            .default_workers(2)
            .partition_workers("slow-account", 1)
            .build(),
    )?;
    let slow = Arc::new(Concurrency::default());
    let fast = Arc::new(Concurrency::default());

    let mut promises = Vec::new();
    for _ in 0..6 {
        for (partition, tracker) in [("slow-account", slow.clone()), ("fast-account", fast.clone())] {
            promises.push(queue.submit(partition, move || async move {
                tracker.enter();
                tokio::time::sleep(Duration::from_millis(20)).await;
                tracker.exit();
                Ok(())
            })?);
        }
    }
    for promise in promises {
        promise.wait().await?;
    }

    assert_eq!(slow.peak.load(Ordering::SeqCst), 1);
    assert_eq!(fast.peak.load(Ordering::SeqCst), 2);
    assert_eq!(queue.partition_stats("slow-account").unwrap().workers, 1);

    Ok(())
}

#[tokio::test]
async fn test_requests_start_in_submission_order() -> Result<()> {
    let queue = queue_with_workers(1);
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut promises = Vec::new();
    for unit in 0..8 {
        let order = order.clone();
        promises.push(queue.submit("acct-1", move || async move {
            order.lock().unwrap().push(unit);
            tokio::task::yield_now().await;
            Ok(())
        })?);
    }
    for promise in promises {
        promise.wait().await?;
    }

    assert_eq!(*order.lock().unwrap(), (0..8).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_burst_from_agent_task_starts_in_submission_order() -> Result<()> {
    for _ in 0..20 {
        let queue = Arc::new(queue_with_workers(1));
        let order = Arc::new(Mutex::new(Vec::new()));

        // Caching agents submit from their own tasks
        let agent = {
            let queue = queue.clone();
            let order = order.clone();
            tokio::spawn(async move {
                let mut promises = Vec::new();
                for unit in 0..8 {
                    let order = order.clone();
                    promises.push(queue.submit("acct-1", move || async move {
                        order.lock().unwrap().push(unit);
                        Ok(())
                    })?);
                }
                for promise in promises {
                    promise.wait().await?;
                }
                anyhow::Ok(())
            })
        };
        agent.await??;

        assert_eq!(*order.lock().unwrap(), (0..8).collect::<Vec<_>>());
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_wider_budget_still_starts_in_submission_order() -> Result<()> {
    let queue = Arc::new(queue_with_workers(3));
    let starts = Arc::new(Mutex::new(Vec::new()));

    let agent = {
        let queue = queue.clone();
        let starts = starts.clone();
        tokio::spawn(async move {
            let mut promises = Vec::new();
            for unit in 0..12usize {
                let starts = starts.clone();
                promises.push(queue.submit("acct-1", move || async move {
                    starts.lock().unwrap().push(unit);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok(())
                })?);
            }
            for promise in promises {
                promise.wait().await?;
            }
            anyhow::Ok(())
        })
    };
    agent.await??;

    // Up to three units start together; none starts before an earlier
    // unit's group has been handed out
    let starts = starts.lock().unwrap().clone();
    assert_eq!(starts.len(), 12);
    for (position, unit) in starts.iter().enumerate() {
        assert!(unit.abs_diff(position) < 3, "unit {unit} started at position {position}");
    }
    Ok(())
}

// ============================================================================
// Cancellation Tests
// ============================================================================

#[tokio::test]
async fn test_cancelled_work_never_runs() -> Result<()> {
    let queue = queue_with_workers(1);
    let (release, hold) = oneshot::channel::<()>();
    let side_effects = Arc::new(AtomicUsize::new(0));

    let blocker = queue.submit("acct-1", || async move {
        hold.await.ok();
        Ok(())
    })?;
    blocker.wait_started(Duration::from_secs(5)).await?;

    let counter = side_effects.clone();
    let cancelled = queue.submit("acct-1", move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })?;
    assert!(cancelled.cancel());

    release.send(()).unwrap();
    blocker.wait().await?;

    assert!(matches!(
        cancelled.wait().await,
        Err(PromiseError::CancelledBeforeStart)
    ));
    // Give the skipped request's worker a chance to run
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(side_effects.load(Ordering::SeqCst), 0);

    let stats = queue.partition_stats("acct-1").unwrap();
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.state, PartitionState::Idle);

    Ok(())
}

#[tokio::test]
async fn test_acct_scenario_cancel_second_of_three() -> Result<()> {
    let queue = queue_with_workers(1);
    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let (release_first, first_gate) = oneshot::channel::<()>();

    let first = {
        let log = log.clone();
        queue.submit("acct-1", move || async move {
            log.lock().unwrap().push("1 start".to_string());
            first_gate.await.ok();
            log.lock().unwrap().push("1 end".to_string());
            Ok(1)
        })?
    };
    let second = {
        let log = log.clone();
        queue.submit("acct-1", move || async move {
            log.lock().unwrap().push("2 start".to_string());
            Ok(2)
        })?
    };
    let third = {
        let log = log.clone();
        queue.submit("acct-1", move || async move {
            log.lock().unwrap().push("3 start".to_string());
            Ok(3)
        })?
    };

    first.wait_started(Duration::from_secs(5)).await?;
    assert!(second.cancel());
    assert_eq!(third.phase(), PromisePhase::Pending);
    release_first.send(()).unwrap();

    assert_eq!(first.wait().await?, 1);
    assert!(matches!(
        second.wait().await,
        Err(PromiseError::CancelledBeforeStart)
    ));
    assert_eq!(third.wait().await?, 3);

    assert_eq!(
        *log.lock().unwrap(),
        vec!["1 start".to_string(), "1 end".to_string(), "3 start".to_string()]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_wait_timeout_cancels_queued_request() -> Result<()> {
    let queue = queue_with_workers(1);
    let runs = Arc::new(AtomicUsize::new(0));

    let blocker = queue.submit("acct-1", || async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    })?;

    let counter = runs.clone();
    let stale = queue.submit("acct-1", move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })?;

    assert!(matches!(
        stale.wait_timeout(Duration::from_secs(1)).await,
        Err(PromiseError::Timeout)
    ));
    assert_eq!(stale.phase(), PromisePhase::Cancelled);

    blocker.wait().await?;
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    Ok(())
}

// ============================================================================
// Promise Resolution Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_resolutions_pick_exactly_one_outcome() -> Result<()> {
    for _ in 0..200 {
        let promise = Promise::<u32>::new();
        let waiter = {
            let promise = promise.clone();
            tokio::spawn(async move { promise.wait().await })
        };

        let ok = {
            let promise = promise.clone();
            tokio::spawn(async move { promise.complete(1) })
        };
        let err = {
            let promise = promise.clone();
            tokio::spawn(async move { promise.complete_with_exception(anyhow::anyhow!("expired")) })
        };

        let (ok, err) = (ok.await?, err.await?);
        assert!(ok ^ err, "exactly one resolution must take effect");

        let seen = waiter.await?;
        let again = promise.wait().await;
        match (seen, again) {
            (Ok(a), Ok(b)) => {
                assert!(ok);
                assert_eq!(a, b);
            }
            (Err(a), Err(b)) => {
                assert!(err);
                assert_eq!(a.to_string(), b.to_string());
            }
            _ => panic!("awaiters observed different outcomes"),
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_work_error_is_carried_not_retried() -> Result<()> {
    let queue = queue_with_workers(2);
    let attempts = Arc::new(AtomicUsize::new(0));

    let counter = attempts.clone();
    let promise: Promise<()> = queue.submit("acct-1", move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("RequestLimitExceeded")
    })?;

    let err = promise.wait().await.unwrap_err();
    assert!(matches!(err, PromiseError::WorkFailed(_)));
    assert!(err.to_string().contains("RequestLimitExceeded"));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    Ok(())
}

// ============================================================================
// Metrics Tests
// ============================================================================

#[derive(Default)]
struct RecordingMetrics {
    waits: Mutex<Vec<Duration>>,
    peak_in_flight: AtomicUsize,
    rejected: AtomicUsize,
}

impl QueueMetrics for RecordingMetrics {
    fn queue_wait(&self, _partition: &str, wait: Duration) {
        self.waits.lock().unwrap().push(wait);
    }

    fn in_flight(&self, _partition: &str, count: usize) {
        self.peak_in_flight.fetch_max(count, Ordering::SeqCst);
    }

    fn rejected(&self, _partition: &str) {
        self.rejected.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn test_metrics_hooks_receive_queue_events() -> Result<()> {
    let metrics = Arc::new(RecordingMetrics::default());
    let queue = RequestQueue::new(
        QueueConfig::builder()
            .default_workers(2)
            .max_backlog(2)
            .build(),
    )?
    .with_metrics(metrics.clone());

    let mut promises = Vec::new();
    for _ in 0..4 {
        promises.push(queue.submit("acct-1", || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        }));
    }
    // Nothing has been picked up yet, so only two fit in the backlog
    assert_eq!(promises.iter().filter(|p| p.is_err()).count(), 2);

    for promise in promises.into_iter().flatten() {
        promise.wait().await?;
    }

    assert_eq!(metrics.waits.lock().unwrap().len(), 2);
    assert_eq!(metrics.peak_in_flight.load(Ordering::SeqCst), 2);
    assert_eq!(metrics.rejected.load(Ordering::SeqCst), 2);

    let stats = queue.partition_stats("acct-1").unwrap();
    assert_eq!(stats.rejected, 2);
    assert_eq!(stats.submitted, 2);

    Ok(())
}
