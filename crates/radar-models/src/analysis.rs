use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mode::ModeDecision;

pub const OUTPUT_SCHEMA_VERSION: u32 = 1;

/// Highest confidence a degraded contribution may carry (0.3).
pub const DEGRADED_CONFIDENCE_CEILING: Decimal = Decimal::from_parts(3, 0, 0, false, 1);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    InProgress,
    Decided,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Decided | RunStatus::Failed)
    }
}

/// States of the orchestration graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    AnalystPhase,
    DebatePhase,
    RiskPhase,
    Decision,
    Terminal,
    Failed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::AnalystPhase => "analyst_phase",
            Phase::DebatePhase => "debate_phase",
            Phase::RiskPhase => "risk_phase",
            Phase::Decision => "decision",
            Phase::Terminal => "terminal",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Reason code attached to a failed run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// No market data for the instrument/date. Nothing downstream ran.
    DataUnavailable,
    /// The debate produced nothing the judge could score.
    DebateFailure,
    /// The outer run deadline expired.
    DeadlineExceeded,
    /// The engine was shut down while the run was in flight.
    Cancelled,
    Internal(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::DataUnavailable => f.write_str("data_unavailable"),
            FailureReason::DebateFailure => f.write_str("debate_failure"),
            FailureReason::DeadlineExceeded => f.write_str("deadline_exceeded"),
            FailureReason::Cancelled => f.write_str("cancelled"),
            FailureReason::Internal(detail) => write!(f, "internal: {detail}"),
        }
    }
}

/// What part of the pipeline a role belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    Market,
    Fundamentals,
    Sentiment,
    News,
    Trader,
    Risk,
}

/// One role's typed output for a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleContribution {
    pub role: String,
    pub kind: RoleKind,
    pub rationale: String,
    /// Normalised confidence in `[0, 1]`.
    pub confidence: Decimal,
    /// Role-specific structured signal summary.
    pub signals: serde_json::Value,
    /// Set when the role ran on incomplete inputs or failed outright.
    pub degraded: bool,
    pub data_sources: Vec<String>,
    pub elapsed_ms: u64,
}

impl RoleContribution {
    pub fn new(
        role: impl Into<String>,
        kind: RoleKind,
        rationale: impl Into<String>,
        confidence: Decimal,
    ) -> Self {
        Self {
            role: role.into(),
            kind,
            rationale: rationale.into(),
            confidence: clamp_unit(confidence),
            signals: serde_json::Value::Null,
            degraded: false,
            data_sources: Vec::new(),
            elapsed_ms: 0,
        }
    }

    /// A contribution standing in for a role that could not run.
    pub fn failed(role: impl Into<String>, kind: RoleKind, reason: impl std::fmt::Display) -> Self {
        Self::new(role, kind, format!("Role failed: {reason}"), Decimal::ZERO).into_degraded()
    }

    /// Flag as degraded and cap confidence at the degraded ceiling.
    pub fn into_degraded(mut self) -> Self {
        self.degraded = true;
        self.confidence = self.confidence.min(DEGRADED_CONFIDENCE_CEILING);
        self
    }

    pub fn with_signals(mut self, signals: serde_json::Value) -> Self {
        self.signals = signals;
        self
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.data_sources = sources;
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }
}

/// Clamp a confidence into `[0, 1]`.
pub fn clamp_unit(value: Decimal) -> Decimal {
    value.clamp(Decimal::ZERO, Decimal::ONE)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Bull,
    Bear,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::Bull => Side::Bear,
            Side::Bear => Side::Bull,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Bull => f.write_str("bull"),
            Side::Bear => f.write_str("bear"),
        }
    }
}

/// One argument in the debate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateTurn {
    /// 1-based round number. A round is one Bull turn plus one Bear turn.
    pub round: u32,
    /// Global turn index within the debate, strictly increasing.
    pub seq: u32,
    pub side: Side,
    pub argument: String,
    pub confidence: Decimal,
    pub cited_roles: Vec<String>,
    pub cited_memories: Vec<Uuid>,
}

impl DebateTurn {
    pub fn citation_count(&self) -> usize {
        self.cited_roles.len() + self.cited_memories.len()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    Bullish,
    Bearish,
    Neutral,
}

impl From<Side> for Stance {
    fn from(side: Side) -> Self {
        match side {
            Side::Bull => Stance::Bullish,
            Side::Bear => Stance::Bearish,
        }
    }
}

/// Why the debate loop stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "side", rename_all = "snake_case")]
pub enum Termination {
    /// Both sides' confidence deltas fell below threshold for a full round.
    Converged,
    /// The given side's argument went unrebutted for the configured turn count.
    Unrebutted(Side),
    /// The round cap was reached.
    RoundCap,
}

/// The judged result of the debate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateOutcome {
    pub stance: Stance,
    pub synthesis: String,
    pub confidence: Decimal,
    pub rounds: u32,
    pub non_convergent: bool,
    pub termination: Termination,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl From<Stance> for TradeAction {
    fn from(stance: Stance) -> Self {
        match stance {
            Stance::Bullish => TradeAction::Buy,
            Stance::Bearish => TradeAction::Sell,
            Stance::Neutral => TradeAction::Hold,
        }
    }
}

/// The trader role's proposal, voted on by the risk roles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradePlan {
    pub action: TradeAction,
    /// Fraction of a standard position, `0` to `1`.
    pub sizing: Decimal,
    pub rationale: String,
}

/// Risk votes, ordered from least to most conservative.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskVote {
    Approve,
    Modify,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskBallot {
    pub role: String,
    pub vote: RiskVote,
    pub rationale: String,
    /// The agent failed; the ballot is recorded but did not count.
    #[serde(default)]
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalDecision {
    pub action: TradeAction,
    /// Fraction of a standard position, `0` to `1`.
    pub sizing_hint: Decimal,
    pub rationale: String,
    pub confidence: Decimal,
    pub risk_verdict: RiskVote,
}

/// Everything one orchestration run knows. Owned by exactly one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisState {
    pub run_id: Uuid,
    pub schema_version: u32,
    pub instrument: String,
    pub as_of: NaiveDate,
    pub status: RunStatus,
    pub phase: Phase,
    pub contributions: BTreeMap<String, RoleContribution>,
    pub debate: Vec<DebateTurn>,
    pub debate_outcome: Option<DebateOutcome>,
    pub trade_plan: Option<TradePlan>,
    pub risk_votes: BTreeMap<String, RiskBallot>,
    pub decision: Option<FinalDecision>,
    pub failure: Option<FailureReason>,
    /// Set when the run deadline cut the pipeline short.
    pub incomplete: bool,
    pub mode: Option<ModeDecision>,
    /// Backlink to the memory record written for this run.
    pub memory_record: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl AnalysisState {
    pub fn new(run_id: Uuid, instrument: impl Into<String>, as_of: NaiveDate) -> Self {
        Self {
            run_id,
            schema_version: OUTPUT_SCHEMA_VERSION,
            instrument: instrument.into(),
            as_of,
            status: RunStatus::Pending,
            phase: Phase::Init,
            contributions: BTreeMap::new(),
            debate: Vec::new(),
            debate_outcome: None,
            trade_plan: None,
            risk_votes: BTreeMap::new(),
            decision: None,
            failure: None,
            incomplete: false,
            mode: None,
            memory_record: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move into `phase`. Ignored once the state is terminal.
    pub fn enter(&mut self, phase: Phase) {
        if self.is_sealed() {
            return;
        }
        self.status = RunStatus::InProgress;
        self.phase = phase;
    }

    /// Insert a contribution. Ignored once the state is terminal.
    pub fn record_contribution(&mut self, contribution: RoleContribution) {
        if self.is_sealed() {
            return;
        }
        self.contributions
            .insert(contribution.role.clone(), contribution);
    }

    pub fn decide(&mut self, decision: FinalDecision) {
        if self.is_sealed() {
            return;
        }
        self.decision = Some(decision);
        self.status = RunStatus::Decided;
        self.phase = Phase::Terminal;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, reason: FailureReason) {
        if self.is_sealed() {
            return;
        }
        self.failure = Some(reason);
        self.status = RunStatus::Failed;
        self.phase = Phase::Failed;
        self.finished_at = Some(Utc::now());
    }

    /// The only mutation allowed after the state is sealed.
    pub fn attach_memory_record(&mut self, record_id: Uuid) {
        self.memory_record = Some(record_id);
    }

    pub fn degraded_roles(&self) -> Vec<&str> {
        self.contributions
            .values()
            .filter(|c| c.degraded)
            .map(|c| c.role.as_str())
            .collect()
    }
}

/// Merge two contribution maps produced by disjoint sets of roles.
///
/// Union over role keys: associative and commutative when the key sets are
/// disjoint. On an overlapping key the non-degraded contribution wins, then
/// the higher confidence, then the lexicographically greater rationale, so
/// the result never depends on argument order.
pub fn merge_contributions(
    mut left: BTreeMap<String, RoleContribution>,
    right: BTreeMap<String, RoleContribution>,
) -> BTreeMap<String, RoleContribution> {
    for (role, incoming) in right {
        match left.remove(&role) {
            Some(existing) => {
                let keep = if preferred(&incoming, &existing) {
                    incoming
                } else {
                    existing
                };
                left.insert(role, keep);
            }
            None => {
                left.insert(role, incoming);
            }
        }
    }
    left
}

fn preferred(a: &RoleContribution, b: &RoleContribution) -> bool {
    (!a.degraded, a.confidence, &a.rationale) > (!b.degraded, b.confidence, &b.rationale)
}
