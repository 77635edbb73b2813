use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which tier of the gateway satisfied a fetch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolSource {
    Cache,
    Live,
    /// Live resolution failed; a stale cached value was served instead.
    Fallback,
}

/// How old a cached value may be and still count as fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    pub max_age: Duration,
}

impl Freshness {
    pub fn within(max_age: Duration) -> Self {
        Self { max_age }
    }

    pub fn within_secs(secs: u64) -> Self {
        Self::within(Duration::from_secs(secs))
    }

    /// Never accept a cached value as fresh; always try the live source first.
    pub fn live() -> Self {
        Self::within(Duration::ZERO)
    }

    pub fn accepts(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match (now - fetched_at).to_std() {
            Ok(age) => age < self.max_age,
            // fetched_at in the future (clock skew): treat as brand new
            Err(_) => !self.max_age.is_zero(),
        }
    }
}

/// Uniform result of every external data call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallResult {
    pub resource_key: String,
    pub payload: serde_json::Value,
    pub source: ToolSource,
    pub latency_ms: u64,
    /// When the payload was obtained from its live source.
    pub fetched_at: DateTime<Utc>,
    pub stale: bool,
    pub staleness_seconds: u64,
    /// Why the live path failed when `source` is `Fallback`.
    pub error: Option<String>,
}

impl ToolCallResult {
    pub fn is_fallback(&self) -> bool {
        self.source == ToolSource::Fallback
    }
}

/// Resource key conventions understood by the gateway's source registry.
///
/// The prefix before the first `:` routes the key to a registered source.
///
/// - Market snapshot: `snapshot:{symbol}:{date}` (e.g., `snapshot:AAPL:2024-01-02`)
/// - Fundamentals: `fundamentals:{symbol}`
/// - News digest: `news:{symbol}`
/// - Sentiment score: `sentiment:{symbol}`
pub mod resource_keys {
    use chrono::NaiveDate;

    pub const SNAPSHOT: &str = "snapshot";
    pub const FUNDAMENTALS: &str = "fundamentals";
    pub const NEWS: &str = "news";
    pub const SENTIMENT: &str = "sentiment";

    pub fn snapshot(symbol: &str, as_of: NaiveDate) -> String {
        format!("{SNAPSHOT}:{symbol}:{as_of}")
    }

    pub fn fundamentals(symbol: &str) -> String {
        format!("{FUNDAMENTALS}:{symbol}")
    }

    pub fn news(symbol: &str) -> String {
        format!("{NEWS}:{symbol}")
    }

    pub fn sentiment(symbol: &str) -> String {
        format!("{SENTIMENT}:{symbol}")
    }

    /// The routing prefix of a key, if it has one.
    pub fn prefix(key: &str) -> Option<&str> {
        key.split_once(':')
            .map(|(prefix, _)| prefix)
            .filter(|p| !p.is_empty())
    }

    /// Parse a snapshot key back into symbol and date.
    pub fn parse_snapshot(key: &str) -> Option<(&str, NaiveDate)> {
        let rest = key.strip_prefix("snapshot:")?;
        let (symbol, date) = rest.rsplit_once(':')?;
        if symbol.is_empty() {
            return None;
        }
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
        Some((symbol, date))
    }

    /// The symbol segment of a single-symbol key such as `news:AAPL`.
    pub fn symbol(key: &str) -> Option<&str> {
        key.split(':').nth(1).filter(|s| !s.is_empty())
    }
}
