//! Read-side filters: relationship filters and identifier globs

use crate::error::{CacheError, Result};
use regex::Regex;
use std::collections::BTreeSet;

/// Restricts which relationship types are returned with a record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CacheFilter {
    /// Return every relationship type
    #[default]
    All,

    /// Return attributes only
    None,

    /// Return only the listed relationship types
    Include(BTreeSet<String>),
}

impl CacheFilter {
    pub fn all() -> Self {
        CacheFilter::All
    }

    pub fn none() -> Self {
        CacheFilter::None
    }

    pub fn include<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CacheFilter::Include(types.into_iter().map(Into::into).collect())
    }

    /// Whether a relationship type passes the filter
    pub fn accepts(&self, relationship_type: &str) -> bool {
        match self {
            CacheFilter::All => true,
            CacheFilter::None => false,
            CacheFilter::Include(types) => types.contains(relationship_type),
        }
    }
}

/// Compiled identifier pattern used by `filter_identifiers`
///
/// Supports `*`, `?` and `[...]` character classes. A pattern without any of
/// those is treated as an id prefix.
#[derive(Debug, Clone)]
pub enum IdPattern {
    Prefix(String),
    Glob {
        regex: Regex,
        /// Literal text before the first metacharacter
        literal: String,
    },
}

impl IdPattern {
    pub fn compile(pattern: &str) -> Result<Self> {
        if !pattern.contains(['*', '?', '[']) {
            return Ok(IdPattern::Prefix(pattern.to_string()));
        }

        let regex = glob_to_regex(pattern)?;
        let regex = Regex::new(&regex).map_err(|e| CacheError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        let literal = pattern
            .split(['*', '?', '['])
            .next()
            .unwrap_or_default()
            .to_string();
        Ok(IdPattern::Glob { regex, literal })
    }

    /// Prefix every matching id starts with; scans can be narrowed to it
    pub fn literal_prefix(&self) -> &str {
        match self {
            IdPattern::Prefix(prefix) => prefix,
            IdPattern::Glob { literal, .. } => literal,
        }
    }

    pub fn matches(&self, id: &str) -> bool {
        match self {
            IdPattern::Prefix(prefix) => id.starts_with(prefix.as_str()),
            IdPattern::Glob { regex, .. } => regex.is_match(id),
        }
    }
}

fn glob_to_regex(glob: &str) -> Result<String> {
    let mut regex = String::with_capacity(glob.len() * 2 + 2);
    regex.push('^');

    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '[' => {
                regex.push('[');
                if chars.peek() == Some(&'!') || chars.peek() == Some(&'^') {
                    chars.next();
                    regex.push('^');
                }
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    if c == '\\' || c == '[' {
                        regex.push('\\');
                    }
                    regex.push(c);
                }
                if !closed {
                    return Err(CacheError::InvalidPattern {
                        pattern: glob.to_string(),
                        reason: "unterminated character class".to_string(),
                    });
                }
                regex.push(']');
            }
            c => regex.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }

    regex.push('$');
    Ok(regex)
}
