use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One daily OHLCV bar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// The immutable market view shared by every analyst role in a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketSnapshot {
    pub instrument: String,
    pub as_of: NaiveDate,
    /// Oldest first; the last bar is the as-of session.
    pub prices: Vec<PriceBar>,
    #[serde(default)]
    pub fundamentals: serde_json::Value,
    /// When the market-data collaborator produced this view.
    pub freshness: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn last_close(&self) -> Option<Decimal> {
        self.prices.last().map(|bar| bar.close)
    }

    /// Fractional change between the last two closes (`0.02` = +2%).
    pub fn day_change(&self) -> Option<Decimal> {
        let n = self.prices.len();
        if n < 2 {
            return None;
        }
        let prev = self.prices[n - 2].close;
        if prev.is_zero() {
            return None;
        }
        Some((self.prices[n - 1].close - prev) / prev)
    }

    /// Fractional change from the first to the last close in the window.
    pub fn window_change(&self) -> Option<Decimal> {
        let first = self.prices.first()?.close;
        let last = self.prices.last()?.close;
        if first.is_zero() {
            return None;
        }
        Some((last - first) / first)
    }

    /// Short human-readable summary used for memory retrieval and prompts.
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("{} as of {}", self.instrument, self.as_of)];
        if let Some(close) = self.last_close() {
            parts.push(format!("last close {}", close.round_dp(2)));
        }
        if let Some(change) = self.day_change() {
            parts.push(format!("day change {}%", (change * Decimal::ONE_HUNDRED).round_dp(2)));
        }
        if let Some(change) = self.window_change() {
            let trend = if change.is_sign_negative() {
                "downtrend"
            } else {
                "uptrend"
            };
            parts.push(format!(
                "{trend} {}% over {} sessions",
                (change * Decimal::ONE_HUNDRED).round_dp(2),
                self.prices.len()
            ));
        }
        parts.join(", ")
    }
}
