use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use radar_models::resource_keys;
use radar_models::snapshot::MarketSnapshot;

use crate::error::GatewayError;
use crate::source::ResourceSource;

/// The external market-data collaborator: produces one snapshot per
/// instrument and date.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn snapshot(
        &self,
        instrument: &str,
        as_of: NaiveDate,
    ) -> Result<MarketSnapshot, GatewayError>;
}

/// Exposes a [`MarketData`] provider under `snapshot:{symbol}:{date}` keys.
pub struct SnapshotSource<M> {
    inner: M,
}

impl<M: MarketData> SnapshotSource<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<M: MarketData> ResourceSource for SnapshotSource<M> {
    fn name(&self) -> &str {
        "market_data"
    }

    async fn fetch(&self, key: &str) -> Result<serde_json::Value, GatewayError> {
        let (instrument, as_of) = resource_keys::parse_snapshot(key)
            .ok_or_else(|| GatewayError::UnknownResource(key.to_string()))?;
        let snapshot = self.inner.snapshot(instrument, as_of).await?;
        Ok(serde_json::to_value(snapshot)?)
    }
}

/// Reads snapshots from `{root}/{SYMBOL}/{YYYY-MM-DD}.json`.
pub struct FileMarketData {
    root: PathBuf,
}

impl FileMarketData {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, instrument: &str, as_of: NaiveDate) -> PathBuf {
        self.root.join(instrument).join(format!("{as_of}.json"))
    }
}

#[async_trait]
impl MarketData for FileMarketData {
    async fn snapshot(
        &self,
        instrument: &str,
        as_of: NaiveDate,
    ) -> Result<MarketSnapshot, GatewayError> {
        let key = resource_keys::snapshot(instrument, as_of);
        let raw = read_json(&self.path_for(instrument, as_of), &key).await?;
        let snapshot: MarketSnapshot = serde_json::from_str(&raw)?;
        if snapshot.instrument != instrument || snapshot.as_of != as_of {
            return Err(GatewayError::data_unavailable(
                key,
                format!(
                    "file holds {} as of {}",
                    snapshot.instrument, snapshot.as_of
                ),
            ));
        }
        Ok(snapshot)
    }
}

/// Serves `{prefix}:{SYMBOL}` keys from `{root}/{SYMBOL}/{prefix}.json`.
pub struct FileResourceSource {
    root: PathBuf,
    prefix: String,
    name: String,
}

impl FileResourceSource {
    pub fn new(root: impl Into<PathBuf>, prefix: &str) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.to_string(),
            name: format!("file_{prefix}"),
        }
    }
}

#[async_trait]
impl ResourceSource for FileResourceSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, key: &str) -> Result<serde_json::Value, GatewayError> {
        let symbol = resource_keys::symbol(key)
            .ok_or_else(|| GatewayError::UnknownResource(key.to_string()))?;
        let path = self.root.join(symbol).join(format!("{}.json", self.prefix));
        let raw = read_json(&path, key).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

async fn read_json(path: &Path, key: &str) -> Result<String, GatewayError> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(raw),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
            GatewayError::data_unavailable(key, format!("{} not found", path.display())),
        ),
        Err(e) => Err(GatewayError::source(
            key,
            format!("reading {}: {e}", path.display()),
        )),
    }
}
