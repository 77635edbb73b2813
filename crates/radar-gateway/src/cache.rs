use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::GatewayError;
use crate::memory::{CachedEntry, HotCache};
use crate::sqlite::SqliteStore;

/// Read-through cache: checks moka (hot) → SQLite (warm) → None.
///
/// On a warm hit, promotes the entry to the hot tier. Writes go to both tiers.
/// Age is never filtered here; the gateway decides fresh vs. stale.
///
/// SQLite access is synchronized via `Mutex` since `rusqlite::Connection` is not `Sync`.
pub struct ToolCache {
    hot: HotCache,
    warm: Option<Mutex<SqliteStore>>,
}

impl ToolCache {
    pub fn new(hot_capacity: u64, hot_retention: Duration, warm: Option<SqliteStore>) -> Self {
        Self {
            hot: HotCache::new(hot_capacity, hot_retention),
            warm: warm.map(Mutex::new),
        }
    }

    /// Hot tier only.
    pub fn in_memory(hot_capacity: u64, hot_retention: Duration) -> Self {
        Self::new(hot_capacity, hot_retention, None)
    }

    pub async fn get(&self, key: &str) -> Result<Option<CachedEntry>, GatewayError> {
        if let Some(entry) = self.hot.get(key).await {
            return Ok(Some(entry));
        }

        let Some(warm) = &self.warm else {
            return Ok(None);
        };

        let entry = {
            let store = warm
                .lock()
                .map_err(|e| GatewayError::Unavailable(format!("SQLite mutex poisoned: {e}")))?;
            store.get(key)?
        };

        if let Some(entry) = entry {
            self.hot.insert(key.to_string(), entry.clone()).await;
            return Ok(Some(entry));
        }

        Ok(None)
    }

    /// Store an entry in both tiers. A warm-tier failure is logged and does not
    /// fail the write, since the hot tier already holds the value.
    pub async fn put(&self, key: &str, entry: CachedEntry) {
        if let Some(warm) = &self.warm {
            let result = warm
                .lock()
                .map_err(|e| GatewayError::Unavailable(format!("SQLite mutex poisoned: {e}")))
                .and_then(|store| store.upsert(key, &entry));
            if let Err(e) = result {
                warn!(key, error = %e, "Warm cache write failed");
            }
        }
        self.hot.insert(key.to_string(), entry).await;
    }

    /// Drop warm entries fetched before `cutoff`. Maintenance only; never
    /// called on the fetch path.
    pub fn prune_warm(&self, cutoff: DateTime<Utc>) -> Result<usize, GatewayError> {
        let Some(warm) = &self.warm else {
            return Ok(0);
        };
        let store = warm
            .lock()
            .map_err(|e| GatewayError::Unavailable(format!("SQLite mutex poisoned: {e}")))?;
        store.prune_before(cutoff)
    }
}
