//! Application configuration
//!
//! Loaded from a YAML file, then overridden by `STRATUS_*` environment
//! variables (a `.env` file in the working directory is read first):
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `STRATUS_LOG_LEVEL` | `logging.level` |
//! | `STRATUS_LOG_FORMAT` | `logging.format` (`pretty` or `json`) |
//! | `STRATUS_QUEUE_DEFAULT_WORKERS` | `queue.default_workers` |
//! | `STRATUS_QUEUE_MAX_BACKLOG` | `queue.max_backlog` |
//! | `STRATUS_QUEUE_START_WORK_TIMEOUT_MS` | `queue.start_work_timeout_ms` |
//! | `STRATUS_QUEUE_TIMEOUT_MS` | `queue.timeout_ms` |
//! | `STRATUS_CACHE_DEFAULT_TTL_SECS` | `cache.default_ttl` |
//! | `STRATUS_CACHE_AUTO_CLEANUP` | `cache.enable_auto_cleanup` |
//! | `STRATUS_PROVIDERS` | comma-separated providers added to `providers` |

use crate::error::{Result, StratusError};
use crate::queue::QueueConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use stratus_cache::{CacheOptions, Provider, ProviderKind};
use tracing::debug;

const ENV_PREFIX: &str = "STRATUS_";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = StratusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(StratusError::InvalidConfig(format!(
                "log format must be 'pretty' or 'json', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for this workspace's crates when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StratusConfig {
    pub cache: CacheOptions,
    pub queue: QueueConfig,
    pub providers: Vec<Provider>,
    pub logging: LoggingConfig,
}

impl StratusConfig {
    /// Parse YAML; missing sections take their defaults
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| StratusError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_yaml(&yaml)
    }

    /// Load `path` (or defaults), apply `.env` and `STRATUS_*` overrides, validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `STRATUS_*` overrides read through `lookup`
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level.to_ascii_lowercase();
        }
        if let Some(format) = var("LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        if let Some(workers) = var("QUEUE_DEFAULT_WORKERS") {
            self.queue.default_workers = parse_number("QUEUE_DEFAULT_WORKERS", &workers)?;
        }
        if let Some(backlog) = var("QUEUE_MAX_BACKLOG") {
            self.queue.max_backlog = parse_number("QUEUE_MAX_BACKLOG", &backlog)?;
        }
        if let Some(ms) = var("QUEUE_START_WORK_TIMEOUT_MS") {
            self.queue.start_work_timeout =
                Duration::from_millis(parse_number("QUEUE_START_WORK_TIMEOUT_MS", &ms)?);
        }
        if let Some(ms) = var("QUEUE_TIMEOUT_MS") {
            self.queue.timeout = Duration::from_millis(parse_number("QUEUE_TIMEOUT_MS", &ms)?);
        }
        if let Some(secs) = var("CACHE_DEFAULT_TTL_SECS") {
            self.cache.default_ttl = Some(Duration::from_secs(parse_number("CACHE_DEFAULT_TTL_SECS", &secs)?));
        }
        if let Some(enabled) = var("CACHE_AUTO_CLEANUP") {
            self.cache.enable_auto_cleanup = parse_number("CACHE_AUTO_CLEANUP", &enabled)?;
        }
        if let Some(providers) = var("PROVIDERS") {
            for name in providers.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let kind: ProviderKind = name.parse()?;
                if !self.providers.iter().any(|p| p.kind == kind) {
                    self.providers.push(Provider::new(kind));
                }
            }
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.cache
            .validate()
            .map_err(|e| StratusError::InvalidConfig(format!("cache: {}", e)))?;
        self.queue
            .validate()
            .map_err(|e| StratusError::InvalidConfig(format!("queue: {}", e)))?;

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(StratusError::InvalidConfig(format!(
                "log level must be one of {:?}, got '{}'",
                LOG_LEVELS, self.logging.level
            )));
        }

        let mut seen = BTreeSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.kind) {
                return Err(StratusError::InvalidConfig(format!(
                    "provider '{}' is configured more than once",
                    provider.kind
                )));
            }
        }

        Ok(())
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        StratusError::InvalidConfig(format!("{ENV_PREFIX}{name}: cannot parse '{}'", value))
    })
}
