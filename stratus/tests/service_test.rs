//! Service Wiring Tests
//!
//! Tests configuration loading and the fetch-then-sweep caching cycle:
//! - YAML config files with environment overrides
//! - Registry and queue construction from config
//! - Authoritative refreshes through the queue

use anyhow::Result;
use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use stratus::queue::PromiseError;
use stratus::{QueueError, Stratus, StratusConfig, StratusError};
use stratus_cache::{Cache, CacheData, MemoryStore, WriteableCache};
use tempfile::NamedTempFile;
use tokio_test::assert_ok;

const CONFIG: &str = r"
cache:
  max_merge_batch_size: 25
queue:
  default_workers: 2
  partition_workers:
    prod-account: 1
providers:
  - kind: aws
    namespaces: [serverGroups, clusters]
  - kind: google
    namespaces: [instances]
";

fn config_file(contents: &str) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    Ok(file)
}

fn server_group(id: &str, cluster: &str) -> CacheData {
    CacheData::new(id)
        .with_attribute("name", id)
        .with_relationship("clusters", [cluster])
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[test]
fn test_config_from_file() -> Result<()> {
    let file = config_file(CONFIG)?;
    let config = StratusConfig::from_file(file.path())?;

    assert_eq!(config.cache.max_merge_batch_size, 25);
    assert_eq!(config.queue.workers_for("prod-account"), 1);
    assert_eq!(config.queue.workers_for("test-account"), 2);
    assert_eq!(config.providers.len(), 2);
    assert_ok!(config.validate());

    Ok(())
}

#[test]
fn test_missing_config_file() {
    let result = StratusConfig::from_file("/nonexistent/stratus.yaml");
    assert!(matches!(result, Err(StratusError::ConfigIo { .. })));
}

#[test]
fn test_malformed_config_file() -> Result<()> {
    let file = config_file("queue: [not, a, map]")?;
    let result = StratusConfig::from_file(file.path());
    assert!(matches!(result, Err(StratusError::ConfigParse(_))));
    Ok(())
}

#[test]
fn test_invalid_config_rejected_at_startup() -> Result<()> {
    let file = config_file("queue:\n  max_backlog: 0\n")?;
    let config = StratusConfig::from_file(file.path())?;
    assert!(matches!(
        Stratus::new(config),
        Err(StratusError::InvalidConfig(_))
    ));
    Ok(())
}

// ============================================================================
// Wiring Tests
// ============================================================================

#[tokio::test]
async fn test_registry_built_from_config() -> Result<()> {
    let stratus = Stratus::new(StratusConfig::from_yaml(CONFIG)?)?;
    let registry = stratus.registry();

    assert!(registry.provider_cache("aws").is_some());
    assert!(registry.provider_cache("google").is_some());
    assert!(registry.provider_cache("azure").is_none());
    assert_eq!(stratus.queue().config().workers_for("prod-account"), 1);

    Ok(())
}

#[tokio::test]
async fn test_refresh_sweeps_through_queue() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let stratus = Stratus::with_store(StratusConfig::from_yaml(CONFIG)?, store.clone())?;

    stratus
        .refresh("aws", "serverGroups", "prod-account", || async {
            Ok(vec![
                server_group("app-main-v001", "app-main"),
                server_group("app-main-v002", "app-main"),
            ])
        })
        .await?;

    let aws = stratus.registry().provider_cache("aws").unwrap();
    let cluster = aws.get("clusters", "app-main").await?.unwrap();
    assert_eq!(cluster.related("serverGroups").count(), 2);

    // The next cycle no longer reports v001
    let eviction = stratus
        .refresh("aws", "serverGroups", "prod-account", || async {
            Ok(vec![server_group("app-main-v002", "app-main")])
        })
        .await?;

    assert_eq!(
        eviction.evicted_ids("serverGroups"),
        BTreeSet::from(["app-main-v001".to_string()])
    );
    let cluster = aws.get("clusters", "app-main").await?.unwrap();
    assert_eq!(
        cluster.related("serverGroups").collect::<Vec<_>>(),
        vec!["app-main-v002"]
    );

    // Both providers write to the same store
    stratus
        .registry()
        .provider_cache("google")
        .unwrap()
        .merge("instances", CacheData::new("vm-1"), true)
        .await?;
    assert_eq!(store.len().await, 3);

    Ok(())
}

#[tokio::test]
async fn test_failed_fetch_leaves_cache_untouched() -> Result<()> {
    let stratus = Stratus::new(StratusConfig::from_yaml(CONFIG)?)?;
    stratus
        .refresh("aws", "serverGroups", "prod-account", || async {
            Ok(vec![server_group("app-main-v001", "app-main")])
        })
        .await?;

    let result = stratus
        .refresh("aws", "serverGroups", "prod-account", || async {
            anyhow::bail!("AccessDenied")
        })
        .await;

    assert!(matches!(
        result,
        Err(StratusError::Queue(QueueError::Request(PromiseError::WorkFailed(_))))
    ));
    let aws = stratus.registry().provider_cache("aws").unwrap();
    assert!(aws.get("serverGroups", "app-main-v001").await?.is_some());

    Ok(())
}

#[tokio::test]
async fn test_refresh_unknown_provider() -> Result<()> {
    let stratus = Stratus::new(StratusConfig::from_yaml(CONFIG)?)?;
    let result = stratus
        .refresh("azure", "serverGroups", "prod-account", || async { Ok(Vec::new()) })
        .await;
    assert!(matches!(result, Err(StratusError::UnknownProvider(_))));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_started_service_cleans_up_expired_records() -> Result<()> {
    let mut config = StratusConfig::from_yaml(CONFIG)?;
    config.cache.enable_auto_cleanup = true;
    config.cache.cleanup_interval = Duration::from_secs(30);

    let mut stratus = Stratus::new(config)?;
    stratus.start();

    let aws = stratus.registry().provider_cache("aws").unwrap();
    aws.merge("clusters", CacheData::new("c-1").with_ttl_seconds(0), true)
        .await?;

    std::thread::sleep(Duration::from_millis(5));
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(aws.get_identifiers("clusters").await?.is_empty());

    stratus.shutdown();
    Ok(())
}
