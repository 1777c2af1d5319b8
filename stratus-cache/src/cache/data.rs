//! Cached records
//!
//! [`CacheData`] is the public, caller-facing shape of a record. The cache
//! persists a richer [`StoredRecord`] that keeps declared and inverse
//! relationships apart and tracks how the record was written, which is what
//! eviction decisions are based on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Relationship type -> set of foreign ids.
///
/// The relationship type names the namespace the foreign ids live in.
pub type Relationships = BTreeMap<String, BTreeSet<String>>;

/// A record of cloud state within one namespace
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CacheData {
    /// Identifier, unique within its namespace
    pub id: String,

    /// Attribute map, merged key by key
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,

    /// Relationships to records in other (or the same) namespaces
    #[serde(default)]
    pub relationships: Relationships,

    /// Optional time-to-live for the record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
}

impl CacheData {
    /// Create an empty record
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Add or replace an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add relationships of one type
    pub fn with_relationship<I, S>(mut self, relationship_type: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relationships
            .entry(relationship_type.into())
            .or_default()
            .extend(ids.into_iter().map(Into::into));
        self
    }

    /// Set a time-to-live in seconds
    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = Some(ttl_seconds);
        self
    }

    /// Foreign ids of a relationship type (empty if none)
    pub fn related(&self, relationship_type: &str) -> impl Iterator<Item = &str> {
        self.relationships
            .get(relationship_type)
            .into_iter()
            .flat_map(|ids| ids.iter().map(String::as_str))
    }
}

/// Address of a record: namespace plus id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordRef {
    pub namespace: String,
    pub id: String,
}

impl RecordRef {
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for RecordRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.id)
    }
}

/// The persisted form of a record
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub(crate) struct StoredRecord {
    pub id: String,

    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,

    /// Relationships this record declared
    #[serde(default)]
    pub relationships: Relationships,

    /// Back-references: source namespace -> ids that declared a relationship to this record
    #[serde(default)]
    pub inverse: Relationships,

    /// Written by an authoritative sweep
    #[serde(default)]
    pub authoritative: bool,

    /// Written by an informative merge
    #[serde(default)]
    pub informative: bool,

    /// Exists only to anchor back-references
    #[serde(default)]
    pub stub: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Incremented on every persisted change
    #[serde(default)]
    pub version: u64,
}

impl StoredRecord {
    pub fn stub(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stub: true,
            ..Default::default()
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }

    /// Whether any record still declares a relationship to this one
    pub fn is_referenced(&self) -> bool {
        self.inverse.values().any(|ids| !ids.is_empty())
    }

    /// Whether a record in a namespace other than `own_namespace` references this one
    pub fn is_referenced_from_elsewhere(&self, own_namespace: &str) -> bool {
        self.inverse
            .iter()
            .any(|(namespace, ids)| namespace != own_namespace && !ids.is_empty())
    }

    pub fn add_inverse(&mut self, source_namespace: &str, source_id: &str) -> bool {
        self.inverse
            .entry(source_namespace.to_string())
            .or_default()
            .insert(source_id.to_string())
    }

    pub fn remove_inverse(&mut self, source_namespace: &str, source_id: &str) -> bool {
        remove_from(&mut self.inverse, source_namespace, source_id)
    }

    pub fn remove_relationship(&mut self, target_namespace: &str, target_id: &str) -> bool {
        remove_from(&mut self.relationships, target_namespace, target_id)
    }

    /// Every (namespace, id) this record declares a relationship to
    pub fn declared_targets(&self) -> Vec<RecordRef> {
        flatten(&self.relationships)
    }

    /// Every (namespace, id) that declared a relationship to this record
    pub fn referrers(&self) -> Vec<RecordRef> {
        flatten(&self.inverse)
    }

    /// Project to the caller-facing shape, keeping only relationship types accepted by `keep`
    pub fn to_cache_data(&self, keep: impl Fn(&str) -> bool) -> CacheData {
        let mut relationships = Relationships::new();
        for (kind, ids) in self.relationships.iter().chain(self.inverse.iter()) {
            if ids.is_empty() || !keep(kind) {
                continue;
            }
            relationships
                .entry(kind.clone())
                .or_default()
                .extend(ids.iter().cloned());
        }

        CacheData {
            id: self.id.clone(),
            attributes: self.attributes.clone(),
            relationships,
            ttl_seconds: None,
        }
    }
}

fn remove_from(map: &mut Relationships, kind: &str, id: &str) -> bool {
    let Some(ids) = map.get_mut(kind) else {
        return false;
    };
    let removed = ids.remove(id);
    if ids.is_empty() {
        map.remove(kind);
    }
    removed
}

fn flatten(map: &Relationships) -> Vec<RecordRef> {
    map.iter()
        .flat_map(|(namespace, ids)| ids.iter().map(move |id| RecordRef::new(namespace.clone(), id.clone())))
        .collect()
}

/// Relationship types may carry an agent suffix (`clusters:aws/ClusterCachingAgent`);
/// only the namespace part is significant.
pub(crate) fn normalize_relationship_type(kind: &str) -> &str {
    kind.split(':').next().unwrap_or(kind)
}
