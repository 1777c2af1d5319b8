//! Process-wide set of provider caches

use crate::cache::Cache;
use crate::error::{CacheError, Result};
use crate::provider::factory::NamedCacheFactory;
use crate::provider::kind::ProviderKind;
use crate::provider::provider_cache::ProviderCache;
use crate::provider::search::{paginate, search_provider, SearchHit, SearchQuery, SearchResultSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A cloud provider: what it caches and which agents populate it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub kind: ProviderKind,

    /// Namespaces the provider's agents write
    #[serde(default)]
    pub namespaces: Vec<String>,

    /// Caching agents producing data for this provider
    #[serde(default)]
    pub agents: Vec<String>,
}

impl Provider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            namespaces: Vec::new(),
            agents: Vec::new(),
        }
    }

    pub fn with_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespaces.extend(namespaces.into_iter().map(Into::into));
        self
    }

    pub fn with_agents<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.agents.extend(agents.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }
}

/// One [`ProviderCache`] per configured provider.
///
/// Built once at startup and never modified afterwards, so lookups need no
/// locking.
pub struct ProviderRegistry {
    providers: Vec<Provider>,
    caches: BTreeMap<ProviderKind, Arc<ProviderCache>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers)
            .finish_non_exhaustive()
    }
}

impl ProviderRegistry {
    /// Create a cache for every provider through `factory`
    pub fn new(providers: Vec<Provider>, factory: &dyn NamedCacheFactory) -> Result<Self> {
        let mut caches = BTreeMap::new();
        for provider in &providers {
            if caches.contains_key(&provider.kind) {
                return Err(CacheError::Config(format!(
                    "Provider '{}' is configured more than once",
                    provider.name()
                )));
            }
            let cache = factory.create(provider.name())?;
            caches.insert(provider.kind, Arc::new(ProviderCache::new(provider.kind, cache)));
            debug!(
                "Registered provider {} ({} namespaces, {} agents)",
                provider.name(),
                provider.namespaces.len(),
                provider.agents.len()
            );
        }

        info!("Provider registry initialized with {} providers", providers.len());
        Ok(Self { providers, caches })
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    /// Cache of the named provider; `None` for unknown or unconfigured names
    pub fn provider_cache(&self, name: &str) -> Option<Arc<ProviderCache>> {
        let kind = name.parse::<ProviderKind>().ok()?;
        self.provider_cache_for(kind)
    }

    pub fn provider_cache_for(&self, kind: ProviderKind) -> Option<Arc<ProviderCache>> {
        self.caches.get(&kind).cloned()
    }

    /// Read views of every provider cache
    pub fn provider_caches(&self) -> Vec<Arc<dyn Cache>> {
        self.caches
            .values()
            .map(|cache| Arc::clone(cache) as Arc<dyn Cache>)
            .collect()
    }

    /// Ids matching `pattern` in the given namespaces of every provider.
    ///
    /// An empty namespace list searches every namespace. Providers are
    /// searched concurrently; hits come back sorted.
    pub async fn search(&self, namespaces: &[String], pattern: &str) -> Result<Vec<SearchHit>> {
        let searches = self
            .caches
            .values()
            .map(|cache| search_provider(Arc::clone(cache), namespaces, pattern));

        let mut hits: Vec<SearchHit> = futures::future::try_join_all(searches)
            .await?
            .into_iter()
            .flatten()
            .collect();
        hits.sort();

        debug!("Search for '{}' found {} hits", pattern, hits.len());
        Ok(hits)
    }

    /// [`ProviderRegistry::search`] returning one page of results
    pub async fn search_page(&self, query: &SearchQuery) -> Result<SearchResultSet> {
        let hits = self.search(&query.namespaces, &query.pattern).await?;
        Ok(paginate(query, hits))
    }

    /// Start periodic expiry cleanup for every provider
    pub fn spawn_auto_cleanup(&self, interval: Duration) -> Vec<JoinHandle<()>> {
        self.caches
            .values()
            .map(|cache| cache.spawn_auto_cleanup(interval))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheData, WriteableCache};
    use crate::provider::MemoryCacheFactory;

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(
            vec![
                Provider::new(ProviderKind::Aws).with_namespaces(["instances"]),
                Provider::new(ProviderKind::Google),
            ],
            &MemoryCacheFactory::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_lookup() {
        let registry = registry();
        assert_eq!(registry.providers().len(), 2);
        assert_eq!(registry.provider_caches().len(), 2);
        assert_eq!(registry.provider_cache("aws").unwrap().kind(), ProviderKind::Aws);
        assert!(registry.provider_cache("azure").is_none());
        assert!(registry.provider_cache("openstack").is_none());
    }

    #[test]
    fn test_duplicate_providers_rejected() {
        let result = ProviderRegistry::new(
            vec![Provider::new(ProviderKind::Aws), Provider::new(ProviderKind::Aws)],
            &MemoryCacheFactory::default(),
        );
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[tokio::test]
    async fn test_search_across_providers() {
        let registry = registry();
        let aws = registry.provider_cache("aws").unwrap();
        let google = registry.provider_cache("google").unwrap();

        aws.merge("instances", CacheData::new("web-1"), true).await.unwrap();
        aws.merge("images", CacheData::new("web-base"), true).await.unwrap();
        google.merge("instances", CacheData::new("web-2"), true).await.unwrap();
        google.merge("instances", CacheData::new("db-1"), true).await.unwrap();

        let hits = registry.search(&["instances".to_string()], "web").await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["web-1", "web-2"]);

        let everywhere = registry.search(&[], "web*").await.unwrap();
        assert_eq!(everywhere.len(), 3);

        let page = registry
            .search_page(&SearchQuery::new("*").page(1, 2))
            .await
            .unwrap();
        assert_eq!(page.total_matches, 4);
        assert_eq!(page.results.len(), 2);
    }
}
