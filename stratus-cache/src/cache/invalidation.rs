//! Eviction reasons and results

use crate::cache::data::RecordRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Why records left the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    /// Missing from an authoritative sweep
    Swept,

    /// TTL expired
    Expired,

    /// Explicit eviction by id
    Manual,

    /// Stub whose last back-reference was removed
    Orphaned,
}

impl std::fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictionReason::Swept => write!(f, "authoritative sweep"),
            EvictionReason::Expired => write!(f, "TTL expired"),
            EvictionReason::Manual => write!(f, "manual eviction"),
            EvictionReason::Orphaned => write!(f, "orphaned stub"),
        }
    }
}

/// Result of an eviction call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Eviction {
    /// Records removed from the cache
    pub evicted: BTreeSet<RecordRef>,

    /// Records kept as stubs because another namespace still references them
    pub demoted: BTreeSet<RecordRef>,

    /// Relationship targets that lost a back-reference; candidates for orphan cleanup
    pub released: BTreeSet<RecordRef>,
}

impl Eviction {
    /// Ids evicted from `namespace`
    pub fn evicted_ids(&self, namespace: &str) -> BTreeSet<String> {
        self.evicted
            .iter()
            .filter(|r| r.namespace == namespace)
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty() && self.demoted.is_empty() && self.released.is_empty()
    }

    /// Fold another eviction into this one
    pub fn absorb(&mut self, other: Eviction) {
        self.evicted.extend(other.evicted);
        self.demoted.extend(other.demoted);
        self.released.extend(other.released);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_display() {
        assert_eq!(EvictionReason::Swept.to_string(), "authoritative sweep");
        assert_eq!(EvictionReason::Orphaned.to_string(), "orphaned stub");
    }

    #[test]
    fn test_evicted_ids_by_namespace() {
        let mut eviction = Eviction::default();
        eviction.evicted.insert(RecordRef::new("serverGroups", "sg-1"));
        eviction.evicted.insert(RecordRef::new("clusters", "c-1"));

        assert_eq!(
            eviction.evicted_ids("serverGroups"),
            BTreeSet::from(["sg-1".to_string()])
        );
        assert!(eviction.evicted_ids("instances").is_empty());
    }

    #[test]
    fn test_absorb() {
        let mut first = Eviction::default();
        first.evicted.insert(RecordRef::new("a", "1"));

        let mut second = Eviction::default();
        second.released.insert(RecordRef::new("b", "2"));

        first.absorb(second);
        assert_eq!(first.evicted.len(), 1);
        assert_eq!(first.released.len(), 1);
        assert!(!first.is_empty());
    }
}
