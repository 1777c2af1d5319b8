//! Configuration for store-backed caches

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options shared by every namespace of a store-backed cache
///
/// Batch sizes bound how many records a single locked write section touches,
/// so one large sweep does not hold namespace locks for its whole duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Records merged per locked batch
    pub max_merge_batch_size: usize,

    /// Records evicted per locked batch
    pub max_evict_batch_size: usize,

    /// Keys requested per store scan page
    pub scan_size: usize,

    /// Records fetched concurrently by `get_all`
    pub max_get_batch_size: usize,

    /// Skip the store write when a merge leaves a record unchanged
    pub skip_unchanged_writes: bool,

    /// TTL applied to merged records that do not carry their own
    #[serde(with = "optional_secs")]
    pub default_ttl: Option<Duration>,

    /// TTL jitter factor (0.0 - 1.0), spreads expiry of records from one sweep
    pub ttl_jitter: f64,

    /// Run periodic removal of expired records
    pub enable_auto_cleanup: bool,

    /// Interval between expired-record sweeps
    #[serde(with = "secs")]
    pub cleanup_interval: Duration,

    /// Enable metrics callbacks
    pub enable_metrics: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_merge_batch_size: 100,
            max_evict_batch_size: 100,
            scan_size: 1_000,
            max_get_batch_size: 64,
            skip_unchanged_writes: true,
            default_ttl: None,
            ttl_jitter: 0.0,
            enable_auto_cleanup: false,
            // Cleanup every 5 minutes
            cleanup_interval: Duration::from_secs(300),
            enable_metrics: true,
        }
    }
}

impl CacheOptions {
    /// Create a new builder for cache options
    pub fn builder() -> CacheOptionsBuilder {
        CacheOptionsBuilder::default()
    }

    /// Validate the options
    pub fn validate(&self) -> Result<(), String> {
        if self.max_merge_batch_size == 0 {
            return Err("max_merge_batch_size must be greater than 0".to_string());
        }

        if self.max_evict_batch_size == 0 {
            return Err("max_evict_batch_size must be greater than 0".to_string());
        }

        if self.scan_size == 0 {
            return Err("scan_size must be greater than 0".to_string());
        }

        if self.max_get_batch_size == 0 {
            return Err("max_get_batch_size must be greater than 0".to_string());
        }

        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err("ttl_jitter must be between 0.0 and 1.0".to_string());
        }

        if self.enable_auto_cleanup && self.cleanup_interval.is_zero() {
            return Err("cleanup_interval must be non-zero when auto cleanup is enabled".to_string());
        }

        Ok(())
    }

    /// Resolve the TTL for a merged record, applying jitter to the default
    pub fn ttl_for(&self, explicit_secs: Option<u64>) -> Option<Duration> {
        if let Some(secs) = explicit_secs {
            return Some(Duration::from_secs(secs));
        }

        let base = self.default_ttl?;
        if self.ttl_jitter == 0.0 {
            return Some(base);
        }

        let base_secs = base.as_secs_f64();
        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        Some(Duration::from_secs_f64((base_secs + jitter).max(1.0)))
    }
}

/// Builder for cache options
#[derive(Debug, Default)]
pub struct CacheOptionsBuilder {
    max_merge_batch_size: Option<usize>,
    max_evict_batch_size: Option<usize>,
    scan_size: Option<usize>,
    max_get_batch_size: Option<usize>,
    skip_unchanged_writes: Option<bool>,
    default_ttl: Option<Duration>,
    ttl_jitter: Option<f64>,
    enable_auto_cleanup: Option<bool>,
    cleanup_interval: Option<Duration>,
    enable_metrics: Option<bool>,
}

impl CacheOptionsBuilder {
    pub fn max_merge_batch_size(mut self, size: usize) -> Self {
        self.max_merge_batch_size = Some(size);
        self
    }

    pub fn max_evict_batch_size(mut self, size: usize) -> Self {
        self.max_evict_batch_size = Some(size);
        self
    }

    pub fn scan_size(mut self, size: usize) -> Self {
        self.scan_size = Some(size);
        self
    }

    pub fn max_get_batch_size(mut self, size: usize) -> Self {
        self.max_get_batch_size = Some(size);
        self
    }

    pub fn skip_unchanged_writes(mut self, enable: bool) -> Self {
        self.skip_unchanged_writes = Some(enable);
        self
    }

    /// Set a default TTL for records merged without one
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    pub fn enable_auto_cleanup(mut self, enable: bool) -> Self {
        self.enable_auto_cleanup = Some(enable);
        self
    }

    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    pub fn enable_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = Some(enable);
        self
    }

    /// Build the cache options
    pub fn build(self) -> CacheOptions {
        let defaults = CacheOptions::default();

        CacheOptions {
            max_merge_batch_size: self.max_merge_batch_size.unwrap_or(defaults.max_merge_batch_size),
            max_evict_batch_size: self.max_evict_batch_size.unwrap_or(defaults.max_evict_batch_size),
            scan_size: self.scan_size.unwrap_or(defaults.scan_size),
            max_get_batch_size: self.max_get_batch_size.unwrap_or(defaults.max_get_batch_size),
            skip_unchanged_writes: self
                .skip_unchanged_writes
                .unwrap_or(defaults.skip_unchanged_writes),
            default_ttl: self.default_ttl.or(defaults.default_ttl),
            ttl_jitter: self.ttl_jitter.unwrap_or(defaults.ttl_jitter),
            enable_auto_cleanup: self
                .enable_auto_cleanup
                .unwrap_or(defaults.enable_auto_cleanup),
            cleanup_interval: self.cleanup_interval.unwrap_or(defaults.cleanup_interval),
            enable_metrics: self.enable_metrics.unwrap_or(defaults.enable_metrics),
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod optional_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|secs| secs.map(Duration::from_secs))
    }
}
