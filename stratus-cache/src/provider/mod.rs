//! Providers and their caches

pub mod factory;
pub mod kind;
pub mod provider_cache;
pub mod registry;
pub mod search;

pub use factory::{MemoryCacheFactory, NamedCacheFactory, StoreCacheFactory};
pub use kind::ProviderKind;
pub use provider_cache::ProviderCache;
pub use registry::{Provider, ProviderRegistry};
pub use search::{SearchHit, SearchQuery, SearchResultSet};
