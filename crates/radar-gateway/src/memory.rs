use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};

/// A cached payload together with the moment it was fetched live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedEntry {
    pub payload: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
    /// Name of the source that produced the payload.
    pub source: String,
}

/// In-memory hot tier backed by moka.
///
/// Entries are retained for `retention`, which is deliberately longer than
/// any freshness window: an entry too old to be fresh can still be served as
/// a fallback when the live source is down.
pub struct HotCache {
    inner: Cache<String, CachedEntry>,
}

impl HotCache {
    pub fn new(max_capacity: u64, retention: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(retention)
                .build(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<CachedEntry> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: String, entry: CachedEntry) {
        self.inner.insert(key, entry).await;
    }
}
