use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::mode::{SystemHealth, UserSignal};

pub const INPUT_SCHEMA_VERSION: u32 = 1;

/// Longest instrument symbol accepted (covers exchange suffixes like `BRK-B.L`).
pub const MAX_INSTRUMENT_LEN: usize = 15;

/// Rejection raised synchronously before a run is admitted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidInput {
    #[error("instrument is empty")]
    EmptyInstrument,

    #[error("instrument {0:?} is not a valid symbol")]
    MalformedInstrument(String),

    #[error("as-of date {as_of} is after {today}")]
    FutureDate { as_of: NaiveDate, today: NaiveDate },

    #[error("unsupported schema version {0}")]
    SchemaVersion(u32),

    #[error("max_rounds override must be at least 1")]
    ZeroRounds,
}

/// Situational signals supplied by the caller alongside the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSignals {
    #[serde(default)]
    pub user: UserSignal,
    #[serde(default)]
    pub system_health: SystemHealth,
}

/// Opaque context produced by an upstream collaborator (e.g. a parsed filing).
/// Appended verbatim to role prompts, never interpreted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextBlock {
    pub source: String,
    pub content: String,
}

/// Per-request tuning that overrides engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunOverrides {
    pub max_rounds: Option<u32>,
}

/// A request for a trading recommendation on one instrument at one date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRequest {
    pub id: Uuid,
    pub schema_version: u32,
    pub instrument: String,
    pub as_of: NaiveDate,
    #[serde(default)]
    pub signals: RunSignals,
    #[serde(default)]
    pub extra_context: Vec<ContextBlock>,
    #[serde(default)]
    pub overrides: Option<RunOverrides>,
}

impl AnalysisRequest {
    pub fn new(instrument: impl Into<String>, as_of: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            schema_version: INPUT_SCHEMA_VERSION,
            instrument: instrument.into(),
            as_of,
            signals: RunSignals::default(),
            extra_context: Vec::new(),
            overrides: None,
        }
    }

    pub fn validate(&self) -> Result<(), InvalidInput> {
        self.validate_at(Utc::now().date_naive())
    }

    /// Validate against an explicit "today", so callers in other time zones
    /// (and tests) can pin the calendar.
    pub fn validate_at(&self, today: NaiveDate) -> Result<(), InvalidInput> {
        if self.schema_version != INPUT_SCHEMA_VERSION {
            return Err(InvalidInput::SchemaVersion(self.schema_version));
        }
        validate_instrument(&self.instrument)?;
        if self.as_of > today {
            return Err(InvalidInput::FutureDate {
                as_of: self.as_of,
                today,
            });
        }
        if let Some(RunOverrides {
            max_rounds: Some(0),
        }) = &self.overrides
        {
            return Err(InvalidInput::ZeroRounds);
        }
        Ok(())
    }

    pub fn max_rounds_override(&self) -> Option<u32> {
        self.overrides.as_ref().and_then(|o| o.max_rounds)
    }
}

fn validate_instrument(symbol: &str) -> Result<(), InvalidInput> {
    if symbol.is_empty() {
        return Err(InvalidInput::EmptyInstrument);
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '=');
    if symbol.len() > MAX_INSTRUMENT_LEN
        || !symbol.chars().all(allowed)
        || !symbol.chars().any(|c| c.is_ascii_alphanumeric())
    {
        return Err(InvalidInput::MalformedInstrument(symbol.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn accepts_plain_request() {
        let request = AnalysisRequest::new("TEST1", date(2024, 1, 2));
        assert!(request.validate_at(date(2024, 6, 1)).is_ok());
    }

    #[test]
    fn accepts_suffixed_symbols() {
        for symbol in ["BRK-B", "VOD.L", "^GSPC", "EURUSD=X"] {
            let request = AnalysisRequest::new(symbol, date(2024, 1, 2));
            assert!(request.validate_at(date(2024, 1, 2)).is_ok(), "{symbol}");
        }
    }

    #[test]
    fn rejects_bad_instruments() {
        let today = date(2024, 6, 1);
        let empty = AnalysisRequest::new("", date(2024, 1, 2));
        assert_eq!(
            empty.validate_at(today),
            Err(InvalidInput::EmptyInstrument)
        );

        for symbol in ["AA PL", "----", "WAYTOOLONGSYMBOL1", "TSLA;DROP"] {
            let request = AnalysisRequest::new(symbol, date(2024, 1, 2));
            assert!(matches!(
                request.validate_at(today),
                Err(InvalidInput::MalformedInstrument(_))
            ));
        }
    }

    #[test]
    fn rejects_future_date() {
        let request = AnalysisRequest::new("AAPL", date(2024, 1, 3));
        assert!(matches!(
            request.validate_at(date(2024, 1, 2)),
            Err(InvalidInput::FutureDate { .. })
        ));
    }

    #[test]
    fn rejects_zero_round_override() {
        let mut request = AnalysisRequest::new("AAPL", date(2024, 1, 2));
        request.overrides = Some(RunOverrides {
            max_rounds: Some(0),
        });
        assert_eq!(
            request.validate_at(date(2024, 1, 2)),
            Err(InvalidInput::ZeroRounds)
        );
    }

    #[test]
    fn minimal_json_uses_defaults() {
        let json = r#"{
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "schema_version": 1,
            "instrument": "TEST1",
            "as_of": "2024-01-02"
        }"#;
        let request: AnalysisRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.signals, RunSignals::default());
        assert!(request.extra_context.is_empty());
        assert_eq!(request.max_rounds_override(), None);
    }
}
