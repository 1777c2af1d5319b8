//! One provider's view of the cache
//!
//! [`ProviderCache`] delegates storage to a [`WriteableCache`] and adds the
//! provider-wide part of eviction: once records are evicted, the stubs they
//! pointed at may have lost their last reference, in any namespace. Those
//! are chased down until nothing more is released.

use crate::cache::{Cache, CacheData, CacheFilter, Eviction, RecordRef, WriteableCache};
use crate::error::Result;
use crate::provider::kind::ProviderKind;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct ProviderCache {
    kind: ProviderKind,
    inner: Arc<dyn WriteableCache>,
}

impl std::fmt::Debug for ProviderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCache")
            .field("kind", &self.kind)
            .field("cache", &self.inner.name())
            .finish()
    }
}

impl ProviderCache {
    pub fn new(kind: ProviderKind, inner: Arc<dyn WriteableCache>) -> Self {
        Self { kind, inner }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn provider_name(&self) -> &'static str {
        self.kind.as_str()
    }

    /// Authoritatively replace a namespace's content with `records`.
    ///
    /// Merges the records, then sweeps every sweep-owned id that was not among them.
    pub async fn put_sweep(&self, namespace: &str, records: Vec<CacheData>) -> Result<Eviction> {
        let keep: BTreeSet<String> = records.iter().map(|r| r.id.clone()).collect();
        self.inner.merge_all(namespace, records, true).await?;
        self.evict_deleted_items(namespace, &keep).await
    }

    /// Evict stubs orphaned by `eviction`, repeating until none are released
    async fn cascade(&self, mut eviction: Eviction) -> Result<Eviction> {
        let mut pending = eviction.released.clone();
        let mut rounds = 0usize;

        while !pending.is_empty() {
            rounds += 1;
            let next = self.inner.evict_orphans(&pending).await?;
            pending = next.released.clone();

            if !next.evicted.is_empty() {
                debug!(
                    "Evicted {} orphaned stubs from {} (round {})",
                    next.evicted.len(),
                    self.provider_name(),
                    rounds
                );
            }
            eviction.absorb(next);
        }

        let evicted = eviction.evicted.clone();
        eviction.released.retain(|r| !evicted.contains(r));
        Ok(eviction)
    }

    /// Run [`WriteableCache::cleanup_expired`] every `interval` until the task is aborted
    pub fn spawn_auto_cleanup(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            info!(
                "Starting automatic cache cleanup for {} (interval: {:?})",
                cache.provider_name(),
                interval
            );

            loop {
                tokio::time::sleep(interval).await;

                match cache.cleanup_expired().await {
                    Ok(eviction) => {
                        if !eviction.evicted.is_empty() {
                            debug!(
                                "Auto cleanup of {}: {} records evicted",
                                cache.provider_name(),
                                eviction.evicted.len()
                            );
                        }
                    }
                    Err(e) => {
                        warn!("Auto cleanup of {} failed: {}", cache.provider_name(), e);
                    }
                }
            }
        })
    }
}

#[async_trait]
impl Cache for ProviderCache {
    async fn get_filtered(&self, namespace: &str, id: &str, filter: &CacheFilter) -> Result<Option<CacheData>> {
        self.inner.get_filtered(namespace, id, filter).await
    }

    async fn get_all(&self, namespace: &str) -> Result<Vec<CacheData>> {
        self.inner.get_all(namespace).await
    }

    async fn get_all_by_ids(&self, namespace: &str, ids: &[String], filter: &CacheFilter) -> Result<Vec<CacheData>> {
        self.inner.get_all_by_ids(namespace, ids, filter).await
    }

    async fn get_identifiers(&self, namespace: &str) -> Result<BTreeSet<String>> {
        self.inner.get_identifiers(namespace).await
    }

    async fn filter_identifiers(&self, namespace: &str, pattern: &str) -> Result<BTreeSet<String>> {
        self.inner.filter_identifiers(namespace, pattern).await
    }

    async fn existing_identifiers(&self, namespace: &str, ids: &[String]) -> Result<BTreeSet<String>> {
        self.inner.existing_identifiers(namespace, ids).await
    }

    async fn namespaces(&self) -> Result<BTreeSet<String>> {
        self.inner.namespaces().await
    }
}

#[async_trait]
impl WriteableCache for ProviderCache {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn merge_all(&self, namespace: &str, items: Vec<CacheData>, authoritative: bool) -> Result<()> {
        self.inner.merge_all(namespace, items, authoritative).await
    }

    async fn evict_deleted_items(&self, namespace: &str, keep_ids: &BTreeSet<String>) -> Result<Eviction> {
        let eviction = self.inner.evict_deleted_items(namespace, keep_ids).await?;
        self.cascade(eviction).await
    }

    async fn evict_all(&self, namespace: &str, ids: &[String]) -> Result<Eviction> {
        let eviction = self.inner.evict_all(namespace, ids).await?;
        self.cascade(eviction).await
    }

    async fn evict_orphans(&self, candidates: &BTreeSet<RecordRef>) -> Result<Eviction> {
        let eviction = self.inner.evict_orphans(candidates).await?;
        self.cascade(eviction).await
    }

    async fn cleanup_expired(&self) -> Result<Eviction> {
        let eviction = self.inner.cleanup_expired().await?;
        self.cascade(eviction).await
    }
}
