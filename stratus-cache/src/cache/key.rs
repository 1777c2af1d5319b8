//! Cache key construction and parsing
//!
//! Keys have the shape `provider:namespace:part[:part...]`. Each component is
//! escaped so that `parse(build(k)) == k` holds for arbitrary strings,
//! including components that themselves contain `:`.

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const SEPARATOR: char = ':';

/// A structured cache store key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    /// Owning provider name (e.g. `aws`)
    pub provider: String,

    /// Namespace within the provider (e.g. `serverGroups`)
    pub namespace: String,

    /// Identifying parts, in order
    pub parts: Vec<String>,
}

impl CacheKey {
    /// Create a key for a single record id
    pub fn record(provider: impl Into<String>, namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            namespace: namespace.into(),
            parts: vec![id.into()],
        }
    }

    /// Start building a key
    pub fn builder(provider: impl Into<String>, namespace: impl Into<String>) -> CacheKeyBuilder {
        CacheKeyBuilder::new(provider, namespace)
    }

    /// Render the key as a store key string
    pub fn build(&self) -> String {
        let mut key = escape(&self.provider);
        key.push(SEPARATOR);
        key.push_str(&escape(&self.namespace));
        for part in &self.parts {
            key.push(SEPARATOR);
            key.push_str(&escape(part));
        }
        key
    }

    /// Parse a store key string produced by [`CacheKey::build`]
    pub fn parse(key: &str) -> Result<Self> {
        let mut segments = key.split(SEPARATOR);

        let provider = segments
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| invalid(key, "missing provider"))?;
        let namespace = segments
            .next()
            .ok_or_else(|| invalid(key, "missing namespace"))?;

        let parts = segments
            .map(|s| unescape(s).ok_or_else(|| invalid(key, "malformed escape sequence")))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            provider: unescape(provider).ok_or_else(|| invalid(key, "malformed escape sequence"))?,
            namespace: unescape(namespace).ok_or_else(|| invalid(key, "malformed escape sequence"))?,
            parts,
        })
    }

    /// The store key prefix shared by every record of a namespace
    pub fn namespace_prefix(provider: &str, namespace: &str) -> String {
        format!("{}{SEPARATOR}{}{SEPARATOR}", escape(provider), escape(namespace))
    }

    /// The store key prefix shared by every record of a provider
    pub fn provider_prefix(provider: &str) -> String {
        format!("{}{SEPARATOR}", escape(provider))
    }

    /// The record id, when the key has exactly one identifying part
    pub fn id(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [id] => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build())
    }
}

/// Builder for keys with several identifying parts
/// (e.g. `aws:serverGroups:cluster:account:region:name`)
pub struct CacheKeyBuilder {
    provider: String,
    namespace: String,
    parts: Vec<String>,
}

impl CacheKeyBuilder {
    /// Create a new cache key builder
    pub fn new(provider: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            namespace: namespace.into(),
            parts: Vec::new(),
        }
    }

    /// Append an identifying part
    pub fn part(mut self, part: impl Into<String>) -> Self {
        self.parts.push(part.into());
        self
    }

    /// Finish the key
    pub fn build(self) -> CacheKey {
        CacheKey {
            provider: self.provider,
            namespace: self.namespace,
            parts: self.parts,
        }
    }
}

fn invalid(key: &str, reason: &str) -> CacheError {
    CacheError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

pub(crate) fn escape(component: &str) -> String {
    let mut escaped = String::with_capacity(component.len());
    for c in component.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn unescape(component: &str) -> Option<String> {
    let mut out = String::with_capacity(component.len());
    let mut chars = component.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let code: String = chars.by_ref().take(2).collect();
        match code.as_str() {
            "25" => out.push('%'),
            "3A" => out.push(':'),
            _ => return None,
        }
    }
    Some(out)
}
