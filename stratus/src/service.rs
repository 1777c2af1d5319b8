//! Explicit wiring of the provider registry and the request queue

use crate::config::StratusConfig;
use crate::error::{Result, StratusError};
use crate::queue::RequestQueue;
use std::future::Future;
use std::sync::Arc;
use stratus_cache::{
    CacheData, CacheStore, Eviction, MemoryCacheFactory, NamedCacheFactory, ProviderRegistry,
    StoreCacheFactory,
};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// The registry and queue of one process, built from configuration.
///
/// Handed to whatever needs them; nothing here is global.
pub struct Stratus {
    config: StratusConfig,
    registry: Arc<ProviderRegistry>,
    queue: Arc<RequestQueue>,
    cleanup_tasks: Vec<JoinHandle<()>>,
}

impl Stratus {
    /// In-memory caches, one store per provider
    pub fn new(config: StratusConfig) -> Result<Self> {
        let factory = MemoryCacheFactory::new(config.cache.clone());
        Self::with_factory(config, &factory)
    }

    /// All providers share `store`, keyed apart by provider name
    pub fn with_store(config: StratusConfig, store: Arc<dyn CacheStore>) -> Result<Self> {
        let factory = StoreCacheFactory::new(store, config.cache.clone());
        Self::with_factory(config, &factory)
    }

    pub fn with_factory(config: StratusConfig, factory: &dyn NamedCacheFactory) -> Result<Self> {
        config.validate()?;

        let registry = ProviderRegistry::new(config.providers.clone(), factory)?;
        let queue = RequestQueue::new(config.queue.clone())?;

        info!(
            "Stratus initialized with {} providers",
            registry.providers().len()
        );

        Ok(Self {
            config,
            registry: Arc::new(registry),
            queue: Arc::new(queue),
            cleanup_tasks: Vec::new(),
        })
    }

    pub fn config(&self) -> &StratusConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<ProviderRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn queue(&self) -> Arc<RequestQueue> {
        Arc::clone(&self.queue)
    }

    /// Start background tasks enabled in the configuration
    pub fn start(&mut self) {
        if self.config.cache.enable_auto_cleanup && self.cleanup_tasks.is_empty() {
            self.cleanup_tasks = self
                .registry
                .spawn_auto_cleanup(self.config.cache.cleanup_interval);
        }
    }

    /// Stop background tasks
    pub fn shutdown(&mut self) {
        for task in self.cleanup_tasks.drain(..) {
            task.abort();
        }
        debug!("Stratus background tasks stopped");
    }

    /// One caching cycle: fetch a namespace's current records through the
    /// queue, then authoritatively replace the namespace with them.
    pub async fn refresh<F, Fut>(
        &self,
        provider: &str,
        namespace: &str,
        partition: &str,
        fetch: F,
    ) -> Result<Eviction>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Vec<CacheData>>> + Send + 'static,
    {
        let cache = self
            .registry
            .provider_cache(provider)
            .ok_or_else(|| StratusError::UnknownProvider(provider.to_string()))?;

        let records = self.queue.execute(partition, fetch).await?;
        let count = records.len();
        let eviction = cache.put_sweep(namespace, records).await?;

        debug!(
            "Refreshed {}:{} from '{}': {} records, {} evicted",
            provider,
            namespace,
            partition,
            count,
            eviction.evicted.len()
        );
        Ok(eviction)
    }
}

impl Drop for Stratus {
    fn drop(&mut self) {
        self.shutdown();
    }
}
