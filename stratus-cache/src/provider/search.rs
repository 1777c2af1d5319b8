//! Identifier search across providers

use crate::cache::Cache;
use crate::error::Result;
use crate::provider::kind::ProviderKind;
use crate::provider::provider_cache::ProviderCache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A record found by a search
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SearchHit {
    pub provider: ProviderKind,
    pub namespace: String,
    pub id: String,
}

/// A paged search request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Identifier glob or prefix
    pub pattern: String,

    /// Namespaces to search; empty means every namespace of every provider
    #[serde(default)]
    pub namespaces: Vec<String>,

    /// 1-based page number
    #[serde(default = "default_page_number")]
    pub page_number: usize,

    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_number() -> usize {
    1
}

fn default_page_size() -> usize {
    10
}

impl SearchQuery {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            namespaces: Vec::new(),
            page_number: default_page_number(),
            page_size: default_page_size(),
        }
    }

    pub fn namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }

    pub fn page(mut self, page_number: usize, page_size: usize) -> Self {
        self.page_number = page_number;
        self.page_size = page_size;
        self
    }
}

/// One page of search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultSet {
    pub query: String,
    pub total_matches: usize,
    pub page_number: usize,
    pub page_size: usize,
    pub results: Vec<SearchHit>,
}

/// Search one provider; runs the namespaces one after another
pub(crate) async fn search_provider(
    cache: Arc<ProviderCache>,
    namespaces: &[String],
    pattern: &str,
) -> Result<Vec<SearchHit>> {
    let namespaces: Vec<String> = if namespaces.is_empty() {
        cache.namespaces().await?.into_iter().collect()
    } else {
        namespaces.to_vec()
    };

    let mut hits = Vec::new();
    for namespace in namespaces {
        for id in cache.filter_identifiers(&namespace, pattern).await? {
            hits.push(SearchHit {
                provider: cache.kind(),
                namespace: namespace.clone(),
                id,
            });
        }
    }
    Ok(hits)
}

/// Cut a sorted hit list into the requested page
pub(crate) fn paginate(query: &SearchQuery, mut hits: Vec<SearchHit>) -> SearchResultSet {
    hits.sort();
    let total_matches = hits.len();
    let page_size = query.page_size.max(1);
    let start = query.page_number.saturating_sub(1).saturating_mul(page_size);

    let results = hits.into_iter().skip(start).take(page_size).collect();

    SearchResultSet {
        query: query.pattern.clone(),
        total_matches,
        page_number: query.page_number,
        page_size,
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str) -> SearchHit {
        SearchHit {
            provider: ProviderKind::Aws,
            namespace: "instances".to_string(),
            id: id.to_string(),
        }
    }

    #[test]
    fn test_paginate() {
        let hits: Vec<SearchHit> = ["i-5", "i-1", "i-3", "i-2", "i-4"].iter().map(|id| hit(id)).collect();

        let first = paginate(&SearchQuery::new("i-").page(1, 2), hits.clone());
        assert_eq!(first.total_matches, 5);
        assert_eq!(first.results, vec![hit("i-1"), hit("i-2")]);

        let last = paginate(&SearchQuery::new("i-").page(3, 2), hits.clone());
        assert_eq!(last.results, vec![hit("i-5")]);

        let beyond = paginate(&SearchQuery::new("i-").page(9, 2), hits);
        assert!(beyond.results.is_empty());
        assert_eq!(beyond.total_matches, 5);
    }
}
