//! Queue metrics hooks and per-partition statistics

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Receives queue events. Every method defaults to a no-op.
pub trait QueueMetrics: Send + Sync {
    /// Time a request spent queued before a worker picked it up
    fn queue_wait(&self, _partition: &str, _wait: Duration) {}

    /// Number of requests executing in a partition, after it changed
    fn in_flight(&self, _partition: &str, _count: usize) {}

    /// A submission was rejected because the partition was saturated
    fn rejected(&self, _partition: &str) {}

    /// A cancelled request was dropped without running
    fn skipped(&self, _partition: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopQueueMetrics;

impl QueueMetrics for NoopQueueMetrics {}

/// Whether a partition currently has work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PartitionState {
    Idle,
    Running { in_flight: usize, backlog: usize },
}

/// Snapshot of one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionStats {
    pub partition: String,

    /// Worker budget
    pub workers: usize,

    pub state: PartitionState,

    pub submitted: u64,
    pub completed: u64,
    pub skipped: u64,
    pub rejected: u64,

    /// Mean queue wait of requests that reached a worker
    pub average_wait: Duration,
}

impl PartitionStats {
    pub fn in_flight(&self) -> usize {
        match self.state {
            PartitionState::Idle => 0,
            PartitionState::Running { in_flight, .. } => in_flight,
        }
    }

    pub fn backlog(&self) -> usize {
        match self.state {
            PartitionState::Idle => 0,
            PartitionState::Running { backlog, .. } => backlog,
        }
    }
}

impl fmt::Display for PartitionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} workers busy, {} waiting, {} submitted, {} completed, {} skipped, {} rejected, avg wait {:?}",
            self.partition,
            self.in_flight(),
            self.workers,
            self.backlog(),
            self.submitted,
            self.completed,
            self.skipped,
            self.rejected,
            self.average_wait
        )
    }
}
