//! Write-through cache over a [`CacheStore`]
//!
//! Every record lives in the backing store under
//! `name:namespace:id`; nothing is held in process besides the namespace
//! locks. Writes run in batches: each batch locks the namespaces it touches,
//! stages record changes in a working set and flushes each touched record
//! exactly once.

use crate::cache::{
    backend::CacheStore,
    config::CacheOptions,
    data::{normalize_relationship_type, CacheData, RecordRef, StoredRecord},
    filter::{CacheFilter, IdPattern},
    invalidation::{EvictionReason, Eviction},
    key::{escape, CacheKey},
    locks::NamespaceLocks,
    metrics::{CacheMetrics, NoopMetrics},
    traits::{Cache, WriteableCache},
    types::MergeStats,
};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Store-backed [`WriteableCache`]
pub struct StoreCache {
    /// Key prefix; usually the provider name
    name: String,

    store: Arc<dyn CacheStore>,

    options: CacheOptions,

    metrics: Arc<dyn CacheMetrics>,

    locks: NamespaceLocks,
}

impl std::fmt::Debug for StoreCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCache")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl StoreCache {
    /// Create a cache named `name` over `store`
    pub fn new(name: impl Into<String>, store: Arc<dyn CacheStore>, options: CacheOptions) -> Result<Self> {
        options.validate().map_err(CacheError::Config)?;

        let name = name.into();
        debug!("Initializing store cache '{}' with options: {:?}", name, options);

        Ok(Self {
            name,
            store,
            options,
            metrics: Arc::new(NoopMetrics),
            locks: NamespaceLocks::default(),
        })
    }

    /// Report operations to `metrics`
    pub fn with_metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    fn record_key(&self, namespace: &str, id: &str) -> String {
        CacheKey::record(self.name.as_str(), namespace, id).build()
    }

    /// Ids in a namespace starting with `id_prefix`, narrowed in the store scan
    async fn scan_identifiers(&self, namespace: &str, id_prefix: &str) -> Result<BTreeSet<String>> {
        let mut prefix = CacheKey::namespace_prefix(&self.name, namespace);
        prefix.push_str(&escape(id_prefix));
        let keys = self.store.keys(&prefix, self.options.scan_size).await?;

        let mut ids = BTreeSet::new();
        for key in keys {
            match CacheKey::parse(&key) {
                Ok(parsed) => {
                    if let Some(id) = parsed.id() {
                        ids.insert(id.to_string());
                    }
                }
                Err(e) => warn!("Skipping foreign key under '{}': {}", prefix, e),
            }
        }
        Ok(ids)
    }

    async fn load(&self, namespace: &str, id: &str) -> Result<Option<StoredRecord>> {
        match self.store.get(&self.record_key(namespace, id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn validate_items(&self, namespace: &str, items: &[CacheData]) -> Result<()> {
        let invalid = |reason: String| CacheError::InvalidRecord {
            namespace: namespace.to_string(),
            reason,
        };

        if namespace.is_empty() {
            return Err(invalid("namespace must not be empty".to_string()));
        }

        for item in items {
            if item.id.is_empty() {
                return Err(invalid("record id must not be empty".to_string()));
            }
            for (kind, ids) in &item.relationships {
                if normalize_relationship_type(kind).is_empty() {
                    return Err(invalid(format!("record '{}' has an empty relationship type", item.id)));
                }
                if ids.iter().any(String::is_empty) {
                    return Err(invalid(format!(
                        "record '{}' has an empty id in relationship '{}'",
                        item.id, kind
                    )));
                }
            }
        }

        Ok(())
    }

    /// Stage and flush one batch; the caller holds the namespace locks
    async fn merge_batch(
        &self,
        namespace: &str,
        batch: &[CacheData],
        authoritative: bool,
        now: DateTime<Utc>,
        stats: &mut MergeStats,
    ) -> Result<Flushed> {
        let mut working = WorkingSet::new(self);
        for item in batch {
            self.merge_one(&mut working, namespace, item, authoritative, now, stats)
                .await?;
        }
        working.flush("merge", namespace).await
    }

    async fn merge_one(
        &self,
        working: &mut WorkingSet<'_>,
        namespace: &str,
        item: &CacheData,
        authoritative: bool,
        now: DateTime<Utc>,
        stats: &mut MergeStats,
    ) -> Result<()> {
        let own = RecordRef::new(namespace, item.id.as_str());

        let mut record = working
            .fetch(&own)
            .await?
            .take()
            .unwrap_or_else(|| StoredRecord {
                id: item.id.clone(),
                ..Default::default()
            });

        if record.is_expired(now) {
            record.attributes.clear();
        }

        for (key, value) in &item.attributes {
            if !value.is_null() {
                record.attributes.insert(key.clone(), value.clone());
            }
        }

        record.stub = false;
        if authoritative {
            record.authoritative = true;
        } else {
            record.informative = true;
        }
        record.expires_at = self
            .options
            .ttl_for(item.ttl_seconds)
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| refreshed_expiry(record.expires_at, now, ttl));

        let mut targets = Vec::new();
        for (kind, ids) in &item.relationships {
            let kind = normalize_relationship_type(kind);
            let declared = record.relationships.entry(kind.to_string()).or_default();
            for id in ids {
                if declared.insert(id.clone()) {
                    stats.relationships_added += 1;
                }
                targets.push(RecordRef::new(kind, id.as_str()));
            }
        }

        *working.fetch(&own).await? = Some(record);

        for target in targets {
            let slot = working.fetch(&target).await?;
            let mut related = slot
                .take()
                .unwrap_or_else(|| StoredRecord::stub(target.id.as_str()));
            related.add_inverse(namespace, &item.id);
            *slot = Some(related);
        }

        Ok(())
    }

    /// Evict one batch of ids from `namespace` according to `reason`
    async fn evict_batch(&self, namespace: &str, ids: &[String], reason: EvictionReason) -> Result<Eviction> {
        let now = Utc::now();

        // Peek first to learn which namespaces the batch will touch. Those can
        // change between the peek and the lock, so check again once locked.
        let mut involved = BTreeSet::from([namespace.to_string()]);
        for id in ids {
            if let Some(record) = self.load(namespace, id).await? {
                involved.extend(linked_namespaces(&record));
            }
        }

        loop {
            let guard = self.locks.acquire(involved.clone()).await;
            let mut working = WorkingSet::new(self);

            let mut needed = BTreeSet::new();
            for id in ids {
                if let Some(record) = working.peek(&RecordRef::new(namespace, id.as_str())).await? {
                    needed.extend(linked_namespaces(record));
                }
            }
            if !guard.covers_all(&needed) {
                debug!(
                    "Relationships in '{}' changed while locking, retrying with {:?}",
                    namespace, needed
                );
                involved.extend(needed);
                continue;
            }

            let mut eviction = Eviction::default();
            for id in ids {
                let own = RecordRef::new(namespace, id.as_str());
                let Some(record) = working.peek(&own).await?.cloned() else {
                    continue;
                };

                match reason {
                    EvictionReason::Swept => {
                        if !record.authoritative {
                            continue;
                        }
                        if record.informative {
                            if let Some(kept) = working.fetch(&own).await?.as_mut() {
                                kept.authoritative = false;
                            }
                        } else if record.is_referenced_from_elsewhere(namespace) {
                            self.demote(&mut working, &own, &record, &mut eviction).await?;
                        } else {
                            self.remove(&mut working, &own, &record, &mut eviction).await?;
                        }
                    }
                    EvictionReason::Expired => {
                        if record.is_expired(now) {
                            self.remove(&mut working, &own, &record, &mut eviction).await?;
                        }
                    }
                    EvictionReason::Manual => {
                        self.remove(&mut working, &own, &record, &mut eviction).await?;
                    }
                    EvictionReason::Orphaned => {
                        if record.stub && !record.is_referenced() {
                            self.remove(&mut working, &own, &record, &mut eviction).await?;
                        }
                    }
                }
            }

            working.flush("eviction", namespace).await?;
            drop(guard);

            let evicted = eviction.evicted.len();
            eviction.released.retain(|r| !eviction.evicted.contains(r));
            if evicted > 0 && self.options.enable_metrics {
                self.metrics.evict(&self.name, namespace, reason, evicted);
            }

            return Ok(eviction);
        }
    }

    /// Delete a record, releasing its relationships in both directions
    async fn remove(
        &self,
        working: &mut WorkingSet<'_>,
        own: &RecordRef,
        record: &StoredRecord,
        eviction: &mut Eviction,
    ) -> Result<()> {
        self.release_declared(working, own, record, eviction).await?;

        for referrer in record.referrers() {
            if &referrer == own {
                continue;
            }
            if let Some(source) = working.fetch(&referrer).await?.as_mut() {
                source.remove_relationship(&own.namespace, &own.id);
            }
        }

        *working.fetch(own).await? = None;
        eviction.evicted.insert(own.clone());
        Ok(())
    }

    /// Keep a still-referenced record as a stub
    async fn demote(
        &self,
        working: &mut WorkingSet<'_>,
        own: &RecordRef,
        record: &StoredRecord,
        eviction: &mut Eviction,
    ) -> Result<()> {
        self.release_declared(working, own, record, eviction).await?;

        if let Some(stub) = working.fetch(own).await?.as_mut() {
            stub.attributes.clear();
            stub.relationships.clear();
            stub.authoritative = false;
            stub.informative = false;
            stub.stub = true;
            stub.expires_at = None;
        }
        eviction.demoted.insert(own.clone());
        Ok(())
    }

    async fn release_declared(
        &self,
        working: &mut WorkingSet<'_>,
        own: &RecordRef,
        record: &StoredRecord,
        eviction: &mut Eviction,
    ) -> Result<()> {
        for target in record.declared_targets() {
            if &target == own {
                continue;
            }
            if let Some(related) = working.fetch(&target).await?.as_mut() {
                related.remove_inverse(&own.namespace, &own.id);
            }
            eviction.released.insert(target);
        }
        Ok(())
    }

    async fn evict_in_batches(&self, namespace: &str, ids: &[String], reason: EvictionReason) -> Result<Eviction> {
        let mut eviction = Eviction::default();
        for batch in ids.chunks(self.options.max_evict_batch_size) {
            eviction.absorb(self.evict_batch(namespace, batch, reason).await?);
        }
        Ok(eviction)
    }
}

fn linked_namespaces(record: &StoredRecord) -> impl Iterator<Item = String> + '_ {
    record
        .relationships
        .keys()
        .chain(record.inverse.keys())
        .cloned()
}

#[async_trait]
impl Cache for StoreCache {
    async fn get_filtered(&self, namespace: &str, id: &str, filter: &CacheFilter) -> Result<Option<CacheData>> {
        let found = self
            .load(namespace, id)
            .await?
            .filter(|record| !record.is_expired(Utc::now()))
            .map(|record| record.to_cache_data(|kind| filter.accepts(kind)));

        if self.options.enable_metrics {
            self.metrics
                .get(&self.name, namespace, 1, usize::from(found.is_some()));
        }
        Ok(found)
    }

    async fn get_all_by_ids(&self, namespace: &str, ids: &[String], filter: &CacheFilter) -> Result<Vec<CacheData>> {
        let now = Utc::now();
        let mut results = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(self.options.max_get_batch_size) {
            let records =
                futures::future::try_join_all(chunk.iter().map(|id| self.load(namespace, id))).await?;
            results.extend(
                records
                    .into_iter()
                    .flatten()
                    .filter(|record| !record.is_expired(now))
                    .map(|record| record.to_cache_data(|kind| filter.accepts(kind))),
            );
        }

        if self.options.enable_metrics {
            self.metrics.get(&self.name, namespace, ids.len(), results.len());
        }
        Ok(results)
    }

    async fn get_identifiers(&self, namespace: &str) -> Result<BTreeSet<String>> {
        self.scan_identifiers(namespace, "").await
    }

    async fn filter_identifiers(&self, namespace: &str, pattern: &str) -> Result<BTreeSet<String>> {
        let pattern = IdPattern::compile(pattern)?;
        let mut ids = self
            .scan_identifiers(namespace, pattern.literal_prefix())
            .await?;
        ids.retain(|id| pattern.matches(id));
        Ok(ids)
    }

    async fn namespaces(&self) -> Result<BTreeSet<String>> {
        let prefix = CacheKey::provider_prefix(&self.name);
        let keys = self.store.keys(&prefix, self.options.scan_size).await?;
        Ok(keys
            .iter()
            .filter_map(|key| CacheKey::parse(key).ok())
            .map(|key| key.namespace)
            .collect())
    }
}

#[async_trait]
impl WriteableCache for StoreCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn merge_all(&self, namespace: &str, items: Vec<CacheData>, authoritative: bool) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.validate_items(namespace, &items)?;

        let now = Utc::now();
        let mut stats = MergeStats {
            items: items.len(),
            ..Default::default()
        };

        let batches: Vec<&[CacheData]> = items.chunks(self.options.max_merge_batch_size).collect();
        for (index, batch) in batches.iter().enumerate() {
            let mut namespaces = BTreeSet::from([namespace.to_string()]);
            for item in batch.iter() {
                namespaces.extend(
                    item.relationships
                        .keys()
                        .map(|kind| normalize_relationship_type(kind).to_string()),
                );
            }

            let guard = self.locks.acquire(namespaces).await;
            let staged = self
                .merge_batch(namespace, batch, authoritative, now, &mut stats)
                .await;
            drop(guard);

            match staged {
                Ok(flushed) => {
                    stats.writes += flushed.writes;
                    stats.skipped_writes += flushed.skipped;
                    stats.batches += 1;
                }
                Err(e) => {
                    let unprocessed = batches[index + 1..]
                        .iter()
                        .flat_map(|b| b.iter())
                        .map(|item| self.record_key(namespace, &item.id));
                    return Err(partial_merge(namespace, stats.writes, e, batch, unprocessed, self));
                }
            }
        }

        if self.options.enable_metrics {
            self.metrics.merge(&self.name, namespace, &stats);
        }
        debug!(
            "Merged {} records into {}:{} (authoritative: {}, {} writes, {} unchanged)",
            stats.items, self.name, namespace, authoritative, stats.writes, stats.skipped_writes
        );

        Ok(())
    }

    async fn evict_deleted_items(&self, namespace: &str, keep_ids: &BTreeSet<String>) -> Result<Eviction> {
        let candidates: Vec<String> = self
            .get_identifiers(namespace)
            .await?
            .into_iter()
            .filter(|id| !keep_ids.contains(id))
            .collect();

        let eviction = self
            .evict_in_batches(namespace, &candidates, EvictionReason::Swept)
            .await?;

        if !eviction.evicted.is_empty() || !eviction.demoted.is_empty() {
            info!(
                "Sweep of {}:{} evicted {} and demoted {} records",
                self.name,
                namespace,
                eviction.evicted.len(),
                eviction.demoted.len()
            );
        }
        Ok(eviction)
    }

    async fn evict_all(&self, namespace: &str, ids: &[String]) -> Result<Eviction> {
        let unique: Vec<String> = ids.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
        let eviction = self
            .evict_in_batches(namespace, &unique, EvictionReason::Manual)
            .await?;
        debug!("Evicted {} records from {}:{}", eviction.evicted.len(), self.name, namespace);
        Ok(eviction)
    }

    async fn evict_orphans(&self, candidates: &BTreeSet<RecordRef>) -> Result<Eviction> {
        let mut by_namespace: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for candidate in candidates {
            by_namespace
                .entry(candidate.namespace.as_str())
                .or_default()
                .push(candidate.id.clone());
        }

        let mut eviction = Eviction::default();
        for (namespace, ids) in by_namespace {
            eviction.absorb(
                self.evict_in_batches(namespace, &ids, EvictionReason::Orphaned)
                    .await?,
            );
        }
        Ok(eviction)
    }

    async fn cleanup_expired(&self) -> Result<Eviction> {
        let mut eviction = Eviction::default();
        for namespace in self.namespaces().await? {
            let ids: Vec<String> = self.get_identifiers(&namespace).await?.into_iter().collect();
            eviction.absorb(
                self.evict_in_batches(&namespace, &ids, EvictionReason::Expired)
                    .await?,
            );
        }

        if !eviction.evicted.is_empty() {
            debug!("Cleaned up {} expired records from {}", eviction.evicted.len(), self.name);
        }
        Ok(eviction)
    }
}

/// Wrap a failed batch into a [`CacheError::PartialWrite`] when earlier batches were applied
fn partial_merge<'a>(
    namespace: &str,
    applied_before: usize,
    error: CacheError,
    batch: &[CacheData],
    unprocessed: impl Iterator<Item = String> + 'a,
    cache: &StoreCache,
) -> CacheError {
    match error {
        CacheError::PartialWrite {
            applied,
            mut remaining,
            reason,
            ..
        } => {
            remaining.extend(unprocessed);
            warn!("Merge into {}:{} partially failed: {}", cache.name, namespace, reason);
            CacheError::PartialWrite {
                operation: "merge",
                namespace: namespace.to_string(),
                applied: applied_before + applied,
                remaining,
                reason,
            }
        }
        other if applied_before > 0 => {
            let remaining = batch
                .iter()
                .map(|item| cache.record_key(namespace, &item.id))
                .chain(unprocessed)
                .collect();
            warn!("Merge into {}:{} partially failed: {}", cache.name, namespace, other);
            CacheError::PartialWrite {
                operation: "merge",
                namespace: namespace.to_string(),
                applied: applied_before,
                remaining,
                reason: other.to_string(),
            }
        }
        other => other,
    }
}

/// Writes applied by one flush
#[derive(Debug, Default, Clone, Copy)]
struct Flushed {
    writes: usize,
    skipped: usize,
}

struct Slot {
    /// Serialized form as loaded, if the record existed
    original: Option<String>,
    current: Option<StoredRecord>,
    dirty: bool,
}

/// Records staged by one locked batch
struct WorkingSet<'a> {
    cache: &'a StoreCache,
    slots: BTreeMap<RecordRef, Slot>,
}

impl<'a> WorkingSet<'a> {
    fn new(cache: &'a StoreCache) -> Self {
        Self {
            cache,
            slots: BTreeMap::new(),
        }
    }

    async fn slot(&mut self, record: &RecordRef) -> Result<&mut Slot> {
        match self.slots.entry(record.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let key = self.cache.record_key(&record.namespace, &record.id);
                let original = self.cache.store.get(&key).await?;
                let current = match original.as_deref() {
                    Some(raw) => Some(serde_json::from_str(raw)?),
                    None => None,
                };
                Ok(entry.insert(Slot {
                    original,
                    current,
                    dirty: false,
                }))
            }
        }
    }

    /// Read a record without marking it for write
    async fn peek(&mut self, record: &RecordRef) -> Result<Option<&StoredRecord>> {
        Ok(self.slot(record).await?.current.as_ref())
    }

    /// Access a record for modification
    async fn fetch(&mut self, record: &RecordRef) -> Result<&mut Option<StoredRecord>> {
        let slot = self.slot(record).await?;
        slot.dirty = true;
        Ok(&mut slot.current)
    }

    async fn flush(self, operation: &'static str, namespace: &str) -> Result<Flushed> {
        let skip_unchanged = self.cache.options.skip_unchanged_writes;
        let mut flushed = Flushed::default();
        let mut pending: Vec<(String, Option<String>)> = Vec::new();

        for (record, slot) in self.slots {
            if !slot.dirty {
                continue;
            }
            let key = self.cache.record_key(&record.namespace, &record.id);
            match slot.current {
                None if slot.original.is_none() => {}
                None => pending.push((key, None)),
                Some(mut current) => {
                    let unchanged = slot.original.as_deref()
                        == Some(serde_json::to_string(&current)?.as_str());
                    if unchanged && skip_unchanged {
                        flushed.skipped += 1;
                        continue;
                    }
                    if !unchanged {
                        current.version += 1;
                    }
                    pending.push((key, Some(serde_json::to_string(&current)?)));
                }
            }
        }

        for index in 0..pending.len() {
            let (key, value) = &pending[index];
            let result = match value {
                Some(value) => self.cache.store.put(key, value.clone()).await,
                None => self.cache.store.delete(key).await,
            };
            if let Err(e) = result {
                return Err(CacheError::PartialWrite {
                    operation,
                    namespace: namespace.to_string(),
                    applied: flushed.writes,
                    remaining: pending[index..].iter().map(|(k, _)| k.clone()).collect(),
                    reason: e.to_string(),
                });
            }
            flushed.writes += 1;
        }

        Ok(flushed)
    }
}

/// Expiry after a merge at `now` with `ttl`.
///
/// A live expiry within half a TTL of the new one is kept, so re-merging an
/// unchanged record does not rewrite it just to move its deadline.
fn refreshed_expiry(
    current: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    ttl: chrono::Duration,
) -> Option<DateTime<Utc>> {
    let next = now.checked_add_signed(ttl)?;
    match current {
        Some(current) if current > now && (next - current).abs() <= ttl / 2 => Some(current),
        _ => Some(next),
    }
}
