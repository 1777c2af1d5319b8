//! Configuration for the request queue

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Worker budgets, backlog bound and timeouts of a [`RequestQueue`](crate::queue::RequestQueue)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Concurrent requests per partition, unless overridden
    pub default_workers: usize,

    /// Per-partition worker budgets
    pub partition_workers: HashMap<String, usize>,

    /// Requests allowed to wait per partition before submissions are rejected
    pub max_backlog: usize,

    /// How long `execute` waits for a worker before giving up on a request
    #[serde(rename = "start_work_timeout_ms", with = "millis")]
    pub start_work_timeout: Duration,

    /// How long `execute` waits for a started request to finish
    #[serde(rename = "timeout_ms", with = "millis")]
    pub timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_workers: 10,
            partition_workers: HashMap::new(),
            max_backlog: 1_000,
            start_work_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
        }
    }
}

impl QueueConfig {
    pub fn builder() -> QueueConfigBuilder {
        QueueConfigBuilder::default()
    }

    /// Worker budget of a partition
    pub fn workers_for(&self, partition: &str) -> usize {
        self.partition_workers
            .get(partition)
            .copied()
            .unwrap_or(self.default_workers)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.default_workers == 0 {
            return Err("default_workers must be greater than 0".to_string());
        }

        if let Some((partition, _)) = self.partition_workers.iter().find(|(_, w)| **w == 0) {
            return Err(format!("worker budget of partition '{}' must be greater than 0", partition));
        }

        if self.max_backlog == 0 {
            return Err("max_backlog must be greater than 0".to_string());
        }

        if self.start_work_timeout.is_zero() || self.timeout.is_zero() {
            return Err("queue timeouts must be non-zero".to_string());
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct QueueConfigBuilder {
    default_workers: Option<usize>,
    partition_workers: HashMap<String, usize>,
    max_backlog: Option<usize>,
    start_work_timeout: Option<Duration>,
    timeout: Option<Duration>,
}

impl QueueConfigBuilder {
    pub fn default_workers(mut self, workers: usize) -> Self {
        self.default_workers = Some(workers);
        self
    }

    /// Override the worker budget of one partition
    pub fn partition_workers(mut self, partition: impl Into<String>, workers: usize) -> Self {
        self.partition_workers.insert(partition.into(), workers);
        self
    }

    pub fn max_backlog(mut self, backlog: usize) -> Self {
        self.max_backlog = Some(backlog);
        self
    }

    pub fn start_work_timeout(mut self, timeout: Duration) -> Self {
        self.start_work_timeout = Some(timeout);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> QueueConfig {
        let defaults = QueueConfig::default();

        QueueConfig {
            default_workers: self.default_workers.unwrap_or(defaults.default_workers),
            partition_workers: self.partition_workers,
            max_backlog: self.max_backlog.unwrap_or(defaults.max_backlog),
            start_work_timeout: self.start_work_timeout.unwrap_or(defaults.start_work_timeout),
            timeout: self.timeout.unwrap_or(defaults.timeout),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
