//! Query cache.
//!
//! Holds fetched responses under the [`QueryKey`] the tracker invalidates.
//! An entry also records the parameters it was fetched with, so a history
//! request with a different limit is treated as a miss.

use chrono::{DateTime, Utc};
use changeline_engine::QueryKey;
use dashmap::DashMap;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
struct CacheEntry {
    params: String,
    value: Value,
    fetched_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct QueryCache {
    entries: DashMap<QueryKey, CacheEntry>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `key`, if it was fetched with the same parameters.
    pub fn get(&self, key: &QueryKey, params: &str) -> Option<Value> {
        let entry = self.entries.get(key).filter(|entry| entry.params == params)?;
        tracing::trace!(
            query_key = ?key.segments(),
            age_ms = (Utc::now() - entry.fetched_at).num_milliseconds(),
            "Query cache hit"
        );
        Some(entry.value.clone())
    }

    pub fn put(&self, key: QueryKey, params: impl Into<String>, value: Value) {
        self.entries.insert(
            key,
            CacheEntry {
                params: params.into(),
                value,
                fetched_at: Utc::now(),
            },
        );
    }

    /// Evict an entry. Returns whether one was present.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let evicted = self.entries.remove(key).is_some();
        if evicted {
            tracing::debug!(query_key = ?key.segments(), "Evicted cached query");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
