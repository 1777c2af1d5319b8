//! # Stratus Cache (stratus-cache)
//!
//! A provider-partitioned, relationship-aware cache for the live state of
//! cloud accounts.
//!
//! ## Features
//!
//! - Namespaced records with attributes and bidirectional relationships
//! - Authoritative sweeps that evict what a caching agent no longer reports
//! - Informative merges that only ever add
//! - Stub records that keep cross-namespace references alive
//! - Optional per-record TTL with periodic cleanup
//! - Pluggable key/value backend ([`CacheStore`]) with an in-memory implementation
//! - Metrics hooks ([`CacheMetrics`]) with an in-process recorder
//!
//! ## Layout
//!
//! - [`cache`]: records, keys, the store contract and [`StoreCache`], the
//!   write-through implementation of [`WriteableCache`]
//! - [`provider`]: one [`ProviderCache`] per cloud, owned by a
//!   [`ProviderRegistry`] for the lifetime of the process
//!
//! ## Example
//!
//! ```rust
//! use stratus_cache::{
//!     Cache, CacheData, MemoryCacheFactory, Provider, ProviderKind, ProviderRegistry, WriteableCache,
//! };
//! use std::collections::BTreeSet;
//!
//! # async fn example() -> stratus_cache::Result<()> {
//! let registry = ProviderRegistry::new(
//!     vec![Provider::new(ProviderKind::Aws).with_namespaces(["serverGroups", "clusters"])],
//!     &MemoryCacheFactory::default(),
//! )?;
//! let aws = registry.provider_cache("aws").expect("aws is configured");
//!
//! aws.merge(
//!     "serverGroups",
//!     CacheData::new("sg-1").with_relationship("clusters", ["c-1"]),
//!     true,
//! )
//! .await?;
//!
//! // The next sweep no longer reports sg-1
//! aws.evict_deleted_items("serverGroups", &BTreeSet::new()).await?;
//! assert!(aws.get("serverGroups", "sg-1").await?.is_none());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod provider;

// Re-export main types for convenience
pub use cache::{
    Cache, CacheData, CacheFilter, CacheKey, CacheKeyBuilder, CacheMetrics, CacheOptions,
    CacheOptionsBuilder, CacheStatsRecorder, CacheStore, Eviction, EvictionReason, MemoryStore,
    MergeStats, NamespaceStats, NoopMetrics, RecordRef, ScanPage, StoreCache, WriteableCache,
};
pub use error::{CacheError, Result};
pub use provider::{
    MemoryCacheFactory, NamedCacheFactory, Provider, ProviderCache, ProviderKind, ProviderRegistry,
    SearchHit, SearchQuery, SearchResultSet, StoreCacheFactory,
};
