use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use radar_models::config::GatewayConfig;
use radar_models::tool::{Freshness, ToolCallResult, ToolSource};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::cache::ToolCache;
use crate::error::GatewayError;
use crate::memory::CachedEntry;
use crate::source::{ResourceSource, SourceRegistry};
use crate::sqlite::SqliteStore;

/// Live attempts per fetch: the first call plus exactly one retry.
pub const LIVE_ATTEMPTS: u32 = 2;

/// Single entry point for every external data call.
///
/// Resolution order: fresh cache entry → live source (with one retry) →
/// stale cache entry as fallback → `DataUnavailable`. Concurrent fetches of
/// the same key share one live call.
pub struct ToolGateway {
    cache: ToolCache,
    registry: RwLock<SourceRegistry>,
    flights: KeyLocks,
    live_timeout: Duration,
}

impl ToolGateway {
    pub fn new(cache: ToolCache, registry: SourceRegistry, live_timeout: Duration) -> Self {
        Self {
            cache,
            registry: RwLock::new(registry),
            flights: KeyLocks::default(),
            live_timeout,
        }
    }

    /// Build the cache tiers from configuration and wrap them around `registry`.
    pub fn from_config(
        config: &GatewayConfig,
        registry: SourceRegistry,
    ) -> Result<Self, GatewayError> {
        let warm = match &config.sqlite_path {
            Some(path) => Some(SqliteStore::open(path)?),
            None => None,
        };
        let cache = ToolCache::new(
            config.hot_capacity,
            Duration::from_secs(config.hot_retention_seconds),
            warm,
        );
        Ok(Self::new(
            cache,
            registry,
            Duration::from_millis(config.live_timeout_ms),
        ))
    }

    /// Register an additional source after construction.
    pub fn register(
        &self,
        prefix: &str,
        source: Arc<dyn ResourceSource>,
    ) -> Result<(), GatewayError> {
        self.registry
            .write()
            .map_err(|e| GatewayError::Registry(format!("registry lock poisoned: {e}")))?
            .register(prefix, source)
    }

    pub fn cache(&self) -> &ToolCache {
        &self.cache
    }

    pub async fn fetch(
        &self,
        key: &str,
        freshness: Freshness,
    ) -> Result<ToolCallResult, GatewayError> {
        let started = Instant::now();
        let requested_at = Utc::now();
        let source = self.resolve(key)?;

        if let Some(entry) = self.lookup(key).await {
            if freshness.accepts(entry.fetched_at, requested_at) {
                debug!(key, "Tool cache hit");
                return Ok(cached_result(key, entry, started));
            }
        }

        let flight = self.flights.enter(key);
        let mut last_failure = flight.lock.lock().await;

        // Another caller may have completed the live call while we waited
        let cached = self.lookup(key).await;
        if let Some(entry) = &cached {
            if entry.fetched_at >= requested_at || freshness.accepts(entry.fetched_at, Utc::now())
            {
                debug!(key, "Tool cache hit after shared flight");
                return Ok(cached_result(key, entry.clone(), started));
            }
        }

        // A flight that failed after we arrived already answered for us
        if let Some(failure) = last_failure.as_ref().filter(|f| f.at >= requested_at) {
            debug!(key, "Reusing failed shared flight");
            let err = GatewayError::data_unavailable(key, failure.reason.clone());
            return degrade(key, cached, err, started);
        }

        match self.fetch_live(key, source.as_ref()).await {
            Ok(payload) => {
                *last_failure = None;
                let entry = CachedEntry {
                    payload,
                    fetched_at: Utc::now(),
                    source: source.name().to_string(),
                };
                self.cache.put(key, entry.clone()).await;
                let latency_ms = started.elapsed().as_millis() as u64;
                info!(key, source = source.name(), latency_ms, "Live fetch succeeded");
                Ok(ToolCallResult {
                    resource_key: key.to_string(),
                    payload: entry.payload,
                    source: ToolSource::Live,
                    latency_ms,
                    fetched_at: entry.fetched_at,
                    stale: false,
                    staleness_seconds: 0,
                    error: None,
                })
            }
            Err(err) => {
                *last_failure = Some(FailedFlight {
                    at: Utc::now(),
                    reason: err.to_string(),
                });
                degrade(key, cached, err, started)
            }
        }
    }

    /// Fetch and deserialize the payload.
    pub async fn fetch_as<T: DeserializeOwned>(
        &self,
        key: &str,
        freshness: Freshness,
    ) -> Result<(T, ToolCallResult), GatewayError> {
        let result = self.fetch(key, freshness).await?;
        let value = serde_json::from_value(result.payload.clone())?;
        Ok((value, result))
    }

    fn resolve(&self, key: &str) -> Result<Arc<dyn ResourceSource>, GatewayError> {
        self.registry
            .read()
            .map_err(|e| GatewayError::Registry(format!("registry lock poisoned: {e}")))?
            .resolve(key)
    }

    /// Cache read that degrades to a miss when the warm tier errors.
    async fn lookup(&self, key: &str) -> Option<CachedEntry> {
        match self.cache.get(key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn fetch_live(
        &self,
        key: &str,
        source: &dyn ResourceSource,
    ) -> Result<serde_json::Value, GatewayError> {
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.live_timeout, source.fetch(key)).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout {
                    key: key.to_string(),
                    timeout_ms: self.live_timeout.as_millis() as u64,
                }),
            };

            match result {
                Ok(payload) => return Ok(payload),
                Err(e) if e.is_transient() && attempt < LIVE_ATTEMPTS => {
                    warn!(key, attempt, error = %e, "Live fetch failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Serve a stale entry as fallback, or report the key unavailable.
fn degrade(
    key: &str,
    cached: Option<CachedEntry>,
    err: GatewayError,
    started: Instant,
) -> Result<ToolCallResult, GatewayError> {
    match cached {
        Some(entry) => {
            let staleness_seconds = age_seconds(entry.fetched_at, Utc::now());
            warn!(key, error = %err, staleness_seconds, "Live fetch failed, serving stale entry");
            Ok(ToolCallResult {
                resource_key: key.to_string(),
                payload: entry.payload,
                source: ToolSource::Fallback,
                latency_ms: started.elapsed().as_millis() as u64,
                fetched_at: entry.fetched_at,
                stale: true,
                staleness_seconds,
                error: Some(err.to_string()),
            })
        }
        None => {
            warn!(key, error = %err, "Live fetch failed with nothing cached");
            match err {
                GatewayError::DataUnavailable { .. } => Err(err),
                other => Err(GatewayError::data_unavailable(key, other.to_string())),
            }
        }
    }
}

fn cached_result(key: &str, entry: CachedEntry, started: Instant) -> ToolCallResult {
    ToolCallResult {
        resource_key: key.to_string(),
        staleness_seconds: age_seconds(entry.fetched_at, Utc::now()),
        payload: entry.payload,
        source: ToolSource::Cache,
        latency_ms: started.elapsed().as_millis() as u64,
        fetched_at: entry.fetched_at,
        stale: false,
        error: None,
    }
}

fn age_seconds(fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - fetched_at).num_seconds().max(0) as u64
}

/// Outcome of the last live call for a key, kept while callers are queued on it.
struct FailedFlight {
    at: DateTime<Utc>,
    reason: String,
}

type FlightLock = Arc<AsyncMutex<Option<FailedFlight>>>;

/// Per-key async locks. An entry lives only while some fetch holds or awaits it.
#[derive(Default)]
struct KeyLocks {
    inner: Mutex<HashMap<String, FlightLock>>,
}

impl KeyLocks {
    fn enter<'a>(&'a self, key: &'a str) -> Flight<'a> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let lock = Arc::clone(map.entry(key.to_string()).or_default());
        Flight {
            locks: self,
            key,
            lock,
        }
    }
}

struct Flight<'a> {
    locks: &'a KeyLocks,
    key: &'a str,
    lock: FlightLock,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        let mut map = self.locks.inner.lock().unwrap_or_else(|e| e.into_inner());
        // The map's handle plus ours: nobody else is waiting on this key
        if Arc::strong_count(&self.lock) == 2 {
            map.remove(self.key);
        }
    }
}
