//! Application-level errors

use crate::queue::{PromiseError, QueueError};
use std::path::PathBuf;
use stratus_cache::CacheError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StratusError {
    #[error("Failed to read config file {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Failed to initialize tracing: {0}")]
    Telemetry(String),
}

impl From<PromiseError> for StratusError {
    fn from(e: PromiseError) -> Self {
        StratusError::Queue(QueueError::Request(e))
    }
}

pub type Result<T> = std::result::Result<T, StratusError>;
