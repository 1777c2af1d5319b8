//! Metrics hooks for cache operations
//!
//! The cache reports what it did through [`CacheMetrics`]; exporting those
//! numbers is left to whoever implements the trait. [`CacheStatsRecorder`]
//! keeps per-namespace counters in process.

use crate::cache::invalidation::EvictionReason;
use crate::cache::types::{MergeStats, NamespaceStats};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Receives counts from cache operations. Every method defaults to a no-op.
pub trait CacheMetrics: Send + Sync {
    fn merge(&self, _prefix: &str, _namespace: &str, _stats: &MergeStats) {}

    fn evict(&self, _prefix: &str, _namespace: &str, _reason: EvictionReason, _count: usize) {}

    fn get(&self, _prefix: &str, _namespace: &str, _requested: usize, _found: usize) {}
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl CacheMetrics for NoopMetrics {}

/// Accumulates [`NamespaceStats`] keyed by `(prefix, namespace)`
#[derive(Debug, Default)]
pub struct CacheStatsRecorder {
    stats: RwLock<HashMap<(String, String), NamespaceStats>>,
}

impl CacheStatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one namespace's counters
    pub fn namespace(&self, prefix: &str, namespace: &str) -> NamespaceStats {
        self.stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(prefix.to_string(), namespace.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of every namespace's counters
    pub fn snapshot(&self) -> HashMap<(String, String), NamespaceStats> {
        self.stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, prefix: &str, namespace: &str, f: impl FnOnce(&mut NamespaceStats)) {
        let mut stats = self.stats.write().unwrap_or_else(PoisonError::into_inner);
        f(stats
            .entry((prefix.to_string(), namespace.to_string()))
            .or_default());
    }
}

impl CacheMetrics for CacheStatsRecorder {
    fn merge(&self, prefix: &str, namespace: &str, merge: &MergeStats) {
        self.update(prefix, namespace, |stats| {
            stats.items_merged += merge.items as u64;
            stats.writes += merge.writes as u64;
            stats.skipped_writes += merge.skipped_writes as u64;
        });
    }

    fn evict(&self, prefix: &str, namespace: &str, reason: EvictionReason, count: usize) {
        let count = count as u64;
        self.update(prefix, namespace, |stats| match reason {
            EvictionReason::Swept => stats.evictions_swept += count,
            EvictionReason::Expired => stats.evictions_expired += count,
            EvictionReason::Manual => stats.evictions_manual += count,
            EvictionReason::Orphaned => stats.evictions_orphaned += count,
        });
    }

    fn get(&self, prefix: &str, namespace: &str, requested: usize, found: usize) {
        self.update(prefix, namespace, |stats| {
            stats.hits += found as u64;
            stats.misses += requested.saturating_sub(found) as u64;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_accumulates() {
        let recorder = CacheStatsRecorder::new();
        recorder.merge(
            "aws",
            "instances",
            &MergeStats {
                items: 5,
                writes: 4,
                skipped_writes: 1,
                ..Default::default()
            },
        );
        recorder.evict("aws", "instances", EvictionReason::Swept, 2);
        recorder.evict("aws", "instances", EvictionReason::Orphaned, 1);
        recorder.get("aws", "instances", 3, 2);

        let stats = recorder.namespace("aws", "instances");
        assert_eq!(stats.items_merged, 5);
        assert_eq!(stats.writes, 4);
        assert_eq!(stats.skipped_writes, 1);
        assert_eq!(stats.evictions_swept, 2);
        assert_eq!(stats.evictions_orphaned, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);

        assert_eq!(recorder.namespace("aws", "clusters"), NamespaceStats::default());
        assert_eq!(recorder.snapshot().len(), 1);
    }
}
