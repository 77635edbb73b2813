use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::snapshot::MarketSnapshot;

/// Interaction tone used to frame prompts. Never affects control flow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Empathetic,
    Analyst,
    Engineer,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserSignal {
    #[default]
    Neutral,
    Curious,
    Stressed,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MarketSignal {
    #[default]
    Calm,
    Volatile,
    Crash,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SystemHealth {
    #[default]
    Healthy,
    Degraded,
    Critical,
}

impl MarketSignal {
    /// Classify the latest session move in a snapshot.
    ///
    /// A one-day drop of at least `crash_drawdown` (e.g. `0.07` for 7%) is a
    /// crash; a move of at least half that in either direction is volatile.
    /// Snapshots with fewer than two bars are calm.
    pub fn classify(snapshot: &MarketSnapshot, crash_drawdown: Decimal) -> Self {
        let Some(change) = snapshot.day_change() else {
            return MarketSignal::Calm;
        };
        if change <= -crash_drawdown {
            MarketSignal::Crash
        } else if change.abs() >= crash_drawdown / Decimal::TWO {
            MarketSignal::Volatile
        } else {
            MarketSignal::Calm
        }
    }
}

/// Output of the mode controller. Recomputed per request, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModeDecision {
    pub mode: Mode,
    pub confidence: Decimal,
    /// The signals that triggered the winning rule.
    pub signals: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::PriceBar;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn snapshot_with_closes(closes: &[Decimal]) -> MarketSnapshot {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        MarketSnapshot {
            instrument: "TEST1".to_string(),
            as_of: start,
            prices: closes
                .iter()
                .enumerate()
                .map(|(i, close)| PriceBar {
                    date: start + chrono::Days::new(i as u64),
                    open: *close,
                    high: *close,
                    low: *close,
                    close: *close,
                    volume: dec!(1000),
                })
                .collect(),
            fundamentals: serde_json::Value::Null,
            freshness: Utc::now(),
        }
    }

    #[test]
    fn classify_crash() {
        let snapshot = snapshot_with_closes(&[dec!(100), dec!(90)]);
        assert_eq!(
            MarketSignal::classify(&snapshot, dec!(0.07)),
            MarketSignal::Crash
        );
    }

    #[test]
    fn classify_volatile_rally() {
        let snapshot = snapshot_with_closes(&[dec!(100), dec!(104)]);
        assert_eq!(
            MarketSignal::classify(&snapshot, dec!(0.07)),
            MarketSignal::Volatile
        );
    }

    #[test]
    fn classify_calm_and_short_history() {
        let calm = snapshot_with_closes(&[dec!(100), dec!(100.5)]);
        assert_eq!(MarketSignal::classify(&calm, dec!(0.07)), MarketSignal::Calm);

        let single = snapshot_with_closes(&[dec!(100)]);
        assert_eq!(
            MarketSignal::classify(&single, dec!(0.07)),
            MarketSignal::Calm
        );
    }

    #[test]
    fn signal_serialization() {
        assert_eq!(
            serde_json::to_string(&UserSignal::Stressed).unwrap(),
            "\"stressed\""
        );
        assert_eq!(
            serde_json::to_string(&SystemHealth::Critical).unwrap(),
            "\"critical\""
        );
    }
}
