//! Error types for cache operations
//!
//! Absence is never an error here: a missing record or an unknown namespace
//! reads as `None` / an empty collection. Errors are reserved for backend
//! failures and invalid input, and they are always surfaced to the caller;
//! nothing in this crate retries on the caller's behalf.

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Backend I/O failure - transient, surfaced to the caller, never retried here
    #[error("Cache store unavailable: {0}")]
    StoreUnavailable(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A cache key could not be parsed
    #[error("Invalid cache key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// An identifier glob could not be compiled
    #[error("Invalid identifier pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A record was rejected before anything was written
    #[error("Invalid record in namespace '{namespace}': {reason}")]
    InvalidRecord { namespace: String, reason: String },

    /// The store failed part way through a batch
    #[error(
        "Partial {operation} in namespace '{namespace}': {applied} writes applied, {} not applied ({reason})",
        .remaining.len()
    )]
    PartialWrite {
        operation: &'static str,
        namespace: String,
        applied: usize,
        /// Store keys that were not written
        remaining: Vec<String>,
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CacheError {
    /// Whether the failure came from the backing store (as opposed to bad input)
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            CacheError::StoreUnavailable(_) | CacheError::PartialWrite { .. }
        )
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
