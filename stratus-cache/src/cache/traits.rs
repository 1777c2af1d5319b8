//! Read and write contracts of a namespaced cache

use crate::cache::data::{CacheData, RecordRef};
use crate::cache::filter::CacheFilter;
use crate::cache::invalidation::Eviction;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Read access to namespaced records
///
/// Unknown namespaces read as empty; they are created on first merge.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch one record with all relationships
    async fn get(&self, namespace: &str, id: &str) -> Result<Option<CacheData>> {
        self.get_filtered(namespace, id, &CacheFilter::All).await
    }

    /// Fetch one record, keeping only relationship types the filter accepts
    async fn get_filtered(&self, namespace: &str, id: &str, filter: &CacheFilter) -> Result<Option<CacheData>>;

    /// Snapshot of every record in a namespace
    async fn get_all(&self, namespace: &str) -> Result<Vec<CacheData>> {
        let ids: Vec<String> = self.get_identifiers(namespace).await?.into_iter().collect();
        self.get_all_by_ids(namespace, &ids, &CacheFilter::All).await
    }

    /// Fetch the listed records; missing ids are skipped
    async fn get_all_by_ids(&self, namespace: &str, ids: &[String], filter: &CacheFilter) -> Result<Vec<CacheData>>;

    /// Every id in a namespace
    async fn get_identifiers(&self, namespace: &str) -> Result<BTreeSet<String>>;

    /// Ids matching a glob (`*`, `?`, `[...]`) or, without glob characters, a prefix
    async fn filter_identifiers(&self, namespace: &str, pattern: &str) -> Result<BTreeSet<String>>;

    /// The subset of `ids` present in the namespace
    async fn existing_identifiers(&self, namespace: &str, ids: &[String]) -> Result<BTreeSet<String>> {
        let all = self.get_identifiers(namespace).await?;
        Ok(ids.iter().filter(|id| all.contains(*id)).cloned().collect())
    }

    /// Namespaces holding at least one record
    async fn namespaces(&self) -> Result<BTreeSet<String>>;
}

/// Write access: merge and eviction with relationship bookkeeping
#[async_trait]
pub trait WriteableCache: Cache {
    /// Name the cache was created under
    fn name(&self) -> &str;

    /// Upsert one record
    async fn merge(&self, namespace: &str, item: CacheData, authoritative: bool) -> Result<()> {
        self.merge_all(namespace, vec![item], authoritative).await
    }

    /// Upsert many records.
    ///
    /// Attributes are merged key by key, relationships are unioned per type
    /// and every relationship target gets a back-reference. An authoritative
    /// merge marks its ids as owned by a sweep so that
    /// [`WriteableCache::evict_deleted_items`] can later remove the ones that
    /// disappear.
    async fn merge_all(&self, namespace: &str, items: Vec<CacheData>, authoritative: bool) -> Result<()>;

    /// Remove sweep-owned ids that are not in `keep_ids`.
    ///
    /// Ids also written informatively survive and lose their sweep mark. Ids
    /// referenced from another namespace survive as stubs.
    async fn evict_deleted_items(&self, namespace: &str, keep_ids: &BTreeSet<String>) -> Result<Eviction>;

    /// Remove the listed ids unconditionally
    async fn evict_all(&self, namespace: &str, ids: &[String]) -> Result<Eviction>;

    /// Remove stubs among `candidates` that nothing references any more
    async fn evict_orphans(&self, candidates: &BTreeSet<RecordRef>) -> Result<Eviction>;

    /// Remove expired records in every namespace
    async fn cleanup_expired(&self) -> Result<Eviction>;
}
