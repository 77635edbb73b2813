use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{RiskVote, RoleKind, Side, TradeAction};
use crate::memory::MemoryMatch;
use crate::mode::Mode;
use crate::request::ContextBlock;
use crate::snapshot::MarketSnapshot;

/// A prior analysis as shown to a role: the record without its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryDigest {
    pub id: Uuid,
    pub summary: String,
    pub outcome: Option<String>,
    pub similarity: f32,
}

impl From<&MemoryMatch> for MemoryDigest {
    fn from(m: &MemoryMatch) -> Self {
        Self {
            id: m.record.id,
            summary: m.record.source_text.clone(),
            outcome: m.record.outcome.clone(),
            similarity: m.similarity,
        }
    }
}

/// Request sent to an analyst role (serialized as JSON into the model prompt).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleRequest {
    pub request_id: Uuid,
    pub run_id: Uuid,
    pub role: String,
    pub kind: RoleKind,
    pub instrument: String,
    pub as_of: NaiveDate,
    pub snapshot: MarketSnapshot,
    pub memories: Vec<MemoryDigest>,
    #[serde(default)]
    pub extra_context: Vec<ContextBlock>,
    pub mode: Mode,
}

/// Response parsed from an analyst role's model output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleResponse {
    /// 0.0 to 1.0 confidence in the role's own reading.
    pub confidence: Decimal,
    pub rationale: String,
    /// Role-specific structured signals.
    #[serde(default)]
    pub signals: serde_json::Value,
    /// Which resource keys the role considered.
    #[serde(default)]
    pub data_sources_consulted: Vec<String>,
}

/// One debater's argument as parsed from model output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArgumentResponse {
    pub argument: String,
    pub confidence: Decimal,
    /// The debater accepts the opponent's standing argument.
    #[serde(default)]
    pub concede: bool,
    #[serde(default)]
    pub cited_roles: Vec<String>,
    #[serde(default)]
    pub cited_memories: Vec<Uuid>,
}

/// The trader role's proposal as parsed from model output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanResponse {
    pub action: TradeAction,
    pub sizing: Decimal,
    pub confidence: Decimal,
    pub rationale: String,
}

/// A risk role's ballot as parsed from model output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteResponse {
    pub vote: RiskVote,
    pub confidence: Decimal,
    pub rationale: String,
}

/// The debater that produced the most recent turn, as seen by its opponent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpposingTurn {
    pub side: Side,
    pub round: u32,
    pub argument: String,
    pub confidence: Decimal,
}
