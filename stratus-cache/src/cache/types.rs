//! Counters reported per namespace

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one merge call, as reported to metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Records submitted by the caller
    pub items: usize,

    /// Records written to the store (including relationship targets)
    pub writes: usize,

    /// Writes skipped because the record was unchanged
    pub skipped_writes: usize,

    /// Relationship edges added
    pub relationships_added: usize,

    /// Locked batches used
    pub batches: usize,
}

/// Accumulated statistics for one namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceStats {
    /// Reads that found a record
    pub hits: u64,

    /// Reads that found nothing
    pub misses: u64,

    /// Records submitted to merges
    pub items_merged: u64,

    /// Records written by merges
    pub writes: u64,

    /// Writes skipped as unchanged
    pub skipped_writes: u64,

    /// Records evicted by authoritative sweeps
    pub evictions_swept: u64,

    /// Records evicted after expiring
    pub evictions_expired: u64,

    /// Records evicted explicitly
    pub evictions_manual: u64,

    /// Stubs evicted after losing their last reference
    pub evictions_orphaned: u64,
}

impl NamespaceStats {
    /// Calculate read hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Calculate total evictions
    pub fn total_evictions(&self) -> u64 {
        self.evictions_swept + self.evictions_expired + self.evictions_manual + self.evictions_orphaned
    }
}

impl fmt::Display for NamespaceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NamespaceStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, merged: {}, writes: {}, skipped: {}, evictions: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.items_merged,
            self.writes,
            self.skipped_writes,
            self.total_evictions()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = NamespaceStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 80.0);
        assert_eq!(NamespaceStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_total_evictions() {
        let stats = NamespaceStats {
            evictions_swept: 3,
            evictions_expired: 2,
            evictions_manual: 1,
            evictions_orphaned: 4,
            ..Default::default()
        };
        assert_eq!(stats.total_evictions(), 10);
    }

    #[test]
    fn test_display() {
        let stats = NamespaceStats {
            hits: 10,
            writes: 4,
            ..Default::default()
        };
        let display = format!("{}", stats);
        assert!(display.contains("hits: 10"));
        assert!(display.contains("writes: 4"));
    }
}
