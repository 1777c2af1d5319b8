//! Namespace-scoped write locks
//!
//! A write that touches several namespaces (a merge writing back-references,
//! an eviction releasing them) holds the lock of each of them. Locks are
//! always taken in sorted order, so two writers can never wait on each other.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub(crate) struct NamespaceLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Guards for a set of namespaces; dropping it releases all of them
#[derive(Debug)]
pub(crate) struct NamespaceGuard {
    namespaces: BTreeSet<String>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl NamespaceGuard {
    pub fn covers_all<'a>(&self, namespaces: impl IntoIterator<Item = &'a String>) -> bool {
        namespaces.into_iter().all(|ns| self.namespaces.contains(ns))
    }
}

impl NamespaceLocks {
    fn lock_for(&self, namespace: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Acquire every listed namespace lock, in sorted order
    pub async fn acquire(&self, namespaces: BTreeSet<String>) -> NamespaceGuard {
        let mut guards = Vec::with_capacity(namespaces.len());
        for namespace in &namespaces {
            guards.push(self.lock_for(namespace).lock_owned().await);
        }
        NamespaceGuard {
            namespaces,
            _guards: guards,
        }
    }
}
