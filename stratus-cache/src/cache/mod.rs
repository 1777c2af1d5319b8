//! # Namespaced relationship cache
//!
//! Records ([`CacheData`]) live in namespaces (`serverGroups`, `clusters`,
//! `instances`, ...) and carry attributes plus relationships to records in
//! other namespaces. The cache keeps relationships bidirectional: declaring
//! `serverGroups/sg-1 -> clusters/c-1` also makes `sg-1` visible from `c-1`.
//!
//! ## Write semantics
//!
//! - **Merge**: attributes are merged key by key (null values are dropped),
//!   relationships are unioned. Records that serialize identically to what is
//!   stored are not rewritten.
//! - **Authoritative vs informative**: an authoritative writer owns the full
//!   set of ids in a namespace, and [`WriteableCache::evict_deleted_items`]
//!   removes the ids it no longer reports. Informative writes only add.
//! - **Stubs**: a record referenced from another namespace survives a sweep
//!   as an attribute-less stub until the last reference goes away.
//! - **TTL**: records may expire; expired records read as absent and are
//!   collected by [`WriteableCache::cleanup_expired`].
//!
//! ## Example
//!
//! ```rust
//! use stratus_cache::cache::{Cache, CacheData, CacheOptions, MemoryStore, StoreCache, WriteableCache};
//! use std::sync::Arc;
//!
//! # async fn example() -> stratus_cache::Result<()> {
//! let cache = StoreCache::new("aws", Arc::new(MemoryStore::new()), CacheOptions::default())?;
//!
//! cache
//!     .merge(
//!         "serverGroups",
//!         CacheData::new("sg-1")
//!             .with_attribute("capacity", 3)
//!             .with_relationship("clusters", ["c-1"]),
//!         true,
//!     )
//!     .await?;
//!
//! let cluster = cache.get("clusters", "c-1").await?.expect("stub exists");
//! assert_eq!(cluster.related("serverGroups").collect::<Vec<_>>(), vec!["sg-1"]);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod data;
pub mod filter;
pub mod invalidation;
pub mod key;
mod locks;
pub mod metrics;
pub mod store;
pub mod traits;
pub mod types;

pub use backend::{CacheStore, MemoryStore, ScanPage};
pub use config::{CacheOptions, CacheOptionsBuilder};
pub use data::{CacheData, RecordRef, Relationships};
pub use filter::{CacheFilter, IdPattern};
pub use invalidation::{Eviction, EvictionReason};
pub use key::{CacheKey, CacheKeyBuilder};
pub use metrics::{CacheMetrics, CacheStatsRecorder, NoopMetrics};
pub use store::StoreCache;
pub use traits::{Cache, WriteableCache};
pub use types::{MergeStats, NamespaceStats};
