//! # Partitioned request queue
//!
//! Caching agents call remote provider APIs through a [`RequestQueue`] so
//! that each account (partition) sees a bounded number of concurrent calls.
//! Every submission returns a [`Promise`], a single-resolution handle that
//! can be awaited, given a deadline, or cancelled before the work starts.
//!
//! ```rust
//! use stratus::queue::{QueueConfig, RequestQueue};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let queue = RequestQueue::new(QueueConfig::builder().default_workers(2).build())?;
//!
//! let promise = queue.submit("prod-account", || async {
//!     // describe instances, list load balancers, ...
//!     Ok(vec!["i-1".to_string(), "i-2".to_string()])
//! })?;
//!
//! let instances = promise.wait().await?;
//! assert_eq!(instances.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod pooled;
pub mod promise;
pub mod request_queue;

pub use config::{QueueConfig, QueueConfigBuilder};
pub use error::{PromiseError, QueueError, QueueResult};
pub use metrics::{NoopQueueMetrics, PartitionState, PartitionStats, QueueMetrics};
pub use pooled::{Execution, PooledRequest, Work};
pub use promise::{Promise, PromisePhase};
pub use request_queue::RequestQueue;
