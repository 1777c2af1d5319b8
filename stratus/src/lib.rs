//! # Stratus
//!
//! Cloud state caching service: a partitioned request queue that bounds
//! concurrent calls per cloud account, wired to the provider caches of
//! `stratus-cache`.

pub mod config;
pub mod error;
pub mod queue;
pub mod service;
pub mod telemetry;

pub use config::{LogFormat, LoggingConfig, StratusConfig};
pub use error::{Result, StratusError};
pub use queue::{
    PartitionState, PartitionStats, Promise, PromiseError, PromisePhase, QueueConfig, QueueError,
    QueueMetrics, RequestQueue,
};
pub use service::Stratus;
pub use telemetry::init_tracing;
