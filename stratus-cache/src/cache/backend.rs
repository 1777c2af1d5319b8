//! Pluggable key/value backend
//!
//! Everything the cache persists goes through [`CacheStore`]. Backends only
//! need atomic single-key operations and a cursor-based prefix scan; the
//! cache layer handles records, relationships and locking on top.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use tokio::sync::RwLock;

/// One page of a prefix scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Keys in this page
    pub keys: Vec<String>,

    /// Cursor for the next page; `None` once the scan is complete
    pub cursor: Option<String>,
}

/// Key/value storage contract
///
/// `get` returns `Ok(None)` for absent keys. `Err` always means the backend
/// itself failed and must be propagated, never read as "absent".
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&self, key: &str, value: String) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Return up to `count` keys starting with `prefix`, after `cursor`.
    ///
    /// Passing the returned cursor back resumes the scan; passing `None`
    /// restarts it. No ordering is promised across pages.
    async fn scan(&self, prefix: &str, cursor: Option<&str>, count: usize) -> Result<ScanPage>;

    /// Drain a full prefix scan
    async fn keys(&self, prefix: &str, page_size: usize) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.scan(prefix, cursor.as_deref(), page_size).await?;
            keys.extend(page.keys);
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(keys),
            }
        }
    }
}

/// In-process backend over an ordered map
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn scan(&self, prefix: &str, cursor: Option<&str>, count: usize) -> Result<ScanPage> {
        let entries = self.entries.read().await;
        let start = match cursor {
            Some(cursor) => Bound::Excluded(cursor.to_string()),
            None => Bound::Included(prefix.to_string()),
        };

        let mut keys: Vec<String> = entries
            .range((start, Bound::Unbounded))
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix))
            .take(count.max(1) + 1)
            .cloned()
            .collect();

        // One extra key was read to learn whether another page exists
        let cursor = if keys.len() > count.max(1) {
            keys.pop();
            keys.last().cloned()
        } else {
            None
        };

        Ok(ScanPage { keys, cursor })
    }
}
