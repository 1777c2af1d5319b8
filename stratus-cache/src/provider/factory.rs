//! Construction of per-provider caches

use crate::cache::{CacheMetrics, CacheOptions, CacheStore, MemoryStore, NoopMetrics, StoreCache, WriteableCache};
use crate::error::Result;
use std::sync::Arc;
use tracing::debug;

/// Creates the cache backing one provider
pub trait NamedCacheFactory: Send + Sync {
    fn create(&self, name: &str) -> Result<Arc<dyn WriteableCache>>;
}

/// Gives every provider its own [`MemoryStore`]
pub struct MemoryCacheFactory {
    options: CacheOptions,
    metrics: Arc<dyn CacheMetrics>,
}

impl MemoryCacheFactory {
    pub fn new(options: CacheOptions) -> Self {
        Self {
            options,
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

impl Default for MemoryCacheFactory {
    fn default() -> Self {
        Self::new(CacheOptions::default())
    }
}

impl NamedCacheFactory for MemoryCacheFactory {
    fn create(&self, name: &str) -> Result<Arc<dyn WriteableCache>> {
        debug!("Creating in-memory cache for '{}'", name);
        let cache = StoreCache::new(name, Arc::new(MemoryStore::new()), self.options.clone())?
            .with_metrics(self.metrics.clone());
        Ok(Arc::new(cache))
    }
}

/// Shares one [`CacheStore`] between providers; the provider name keeps their keys apart
pub struct StoreCacheFactory {
    store: Arc<dyn CacheStore>,
    options: CacheOptions,
    metrics: Arc<dyn CacheMetrics>,
}

impl StoreCacheFactory {
    pub fn new(store: Arc<dyn CacheStore>, options: CacheOptions) -> Self {
        Self {
            store,
            options,
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

impl NamedCacheFactory for StoreCacheFactory {
    fn create(&self, name: &str) -> Result<Arc<dyn WriteableCache>> {
        debug!("Creating store-backed cache for '{}'", name);
        let cache = StoreCache::new(name, self.store.clone(), self.options.clone())?
            .with_metrics(self.metrics.clone());
        Ok(Arc::new(cache))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, CacheData};

    #[tokio::test]
    async fn test_shared_store_keeps_providers_apart() {
        let store = Arc::new(MemoryStore::new());
        let factory = StoreCacheFactory::new(store.clone(), CacheOptions::default());

        let aws = factory.create("aws").unwrap();
        let google = factory.create("google").unwrap();

        aws.merge("instances", CacheData::new("i-1"), true).await.unwrap();
        google.merge("instances", CacheData::new("vm-1"), true).await.unwrap();

        assert_eq!(aws.get_identifiers("instances").await.unwrap().len(), 1);
        assert!(google.get("instances", "i-1").await.unwrap().is_none());
        assert_eq!(store.len().await, 2);
        assert_eq!(aws.name(), "aws");
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let factory = MemoryCacheFactory::new(CacheOptions::builder().max_merge_batch_size(0).build());
        assert!(factory.create("aws").is_err());
    }
}
