//! Integration tests for the provider registry

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use stratus_cache::{
    Cache, CacheData, CacheOptions, MemoryCacheFactory, MemoryStore, Provider, ProviderKind,
    ProviderRegistry, SearchQuery, StoreCacheFactory, WriteableCache,
};
use tokio_test::{assert_err, assert_ok};

fn providers() -> Vec<Provider> {
    vec![
        Provider::new(ProviderKind::Aws)
            .with_namespaces(["serverGroups", "clusters", "instances"])
            .with_agents(["ClusterCachingAgent", "InstanceCachingAgent"]),
        Provider::new(ProviderKind::Kubernetes).with_namespaces(["pods"]),
    ]
}

#[tokio::test]
async fn test_registry_routes_by_provider_name() {
    let registry = assert_ok!(ProviderRegistry::new(providers(), &MemoryCacheFactory::default()));

    let aws = registry.provider_cache("aws").unwrap();
    let k8s = registry.provider_cache("kubernetes").unwrap();
    assert_eq!(aws.provider_name(), "aws");
    assert_eq!(k8s.provider_name(), "kubernetes");
    assert!(registry.provider_cache("google").is_none());

    aws.merge("instances", CacheData::new("i-1"), true).await.unwrap();
    assert!(k8s.get("instances", "i-1").await.unwrap().is_none());

    let names: Vec<&str> = registry.providers().iter().map(Provider::name).collect();
    assert_eq!(names, vec!["aws", "kubernetes"]);
}

#[tokio::test]
async fn test_provider_caches_share_one_store() {
    let store = Arc::new(MemoryStore::new());
    let factory = StoreCacheFactory::new(store.clone(), CacheOptions::default());
    let registry = ProviderRegistry::new(providers(), &factory).unwrap();

    registry
        .provider_cache("aws")
        .unwrap()
        .merge("instances", CacheData::new("i-1"), true)
        .await
        .unwrap();
    registry
        .provider_cache("kubernetes")
        .unwrap()
        .merge("pods", CacheData::new("web-0"), true)
        .await
        .unwrap();

    assert_eq!(store.len().await, 2);

    let mut all_ids = BTreeSet::new();
    for cache in registry.provider_caches() {
        for namespace in cache.namespaces().await.unwrap() {
            all_ids.extend(cache.get_identifiers(&namespace).await.unwrap());
        }
    }
    assert_eq!(all_ids.len(), 2);
}

#[tokio::test]
async fn test_search_pages_through_all_providers() {
    let registry = ProviderRegistry::new(providers(), &MemoryCacheFactory::default()).unwrap();
    let aws = registry.provider_cache("aws").unwrap();
    let k8s = registry.provider_cache("kubernetes").unwrap();

    aws.merge_all(
        "instances",
        (0..5).map(|i| CacheData::new(format!("web-{i}"))).collect(),
        true,
    )
    .await
    .unwrap();
    k8s.merge("pods", CacheData::new("web-pod"), true).await.unwrap();

    let page = registry
        .search_page(&SearchQuery::new("web-*").page(2, 4))
        .await
        .unwrap();
    assert_eq!(page.total_matches, 6);
    assert_eq!(page.results.len(), 2);
    assert_eq!(page.results[1].provider, ProviderKind::Kubernetes);

    assert_err!(registry.search(&[], "web-[").await);
}

#[tokio::test(start_paused = true)]
async fn test_auto_cleanup_evicts_expired_records() {
    let registry = ProviderRegistry::new(providers(), &MemoryCacheFactory::default()).unwrap();
    let aws = registry.provider_cache("aws").unwrap();

    aws.merge("instances", CacheData::new("i-1").with_ttl_seconds(0), true)
        .await
        .unwrap();

    let handles = registry.spawn_auto_cleanup(Duration::from_secs(60));
    assert_eq!(handles.len(), 2);

    // Expiry is wall-clock based; the paused clock only drives the cleanup interval
    std::thread::sleep(Duration::from_millis(5));
    tokio::time::sleep(Duration::from_secs(61)).await;

    assert!(aws.get_identifiers("instances").await.unwrap().is_empty());

    for handle in handles {
        handle.abort();
    }
}
