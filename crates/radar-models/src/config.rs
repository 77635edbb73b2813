use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::analysis::RoleKind;

/// Top-level configuration for the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub gateway: GatewayConfig,
    pub memory: MemoryConfig,
    pub agents: AgentsConfig,
    pub debate: DebateConfig,
    pub run: RunConfig,
    pub market_data: MarketDataConfig,
}

/// Configuration for the tool gateway and its cache tiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Warm-tier SQLite cache. `None` keeps the cache purely in memory.
    pub sqlite_path: Option<String>,
    /// Maximum number of entries in the in-memory moka cache.
    pub hot_capacity: u64,
    /// How long an entry stays in the hot tier. Must exceed every freshness
    /// window, since stale hot entries are still served as fallbacks.
    pub hot_retention_seconds: u64,
    /// Timeout for a single live attempt.
    pub live_timeout_ms: u64,
    /// Freshness window for market snapshots.
    pub snapshot_max_age_seconds: u64,
    /// Freshness window for fundamentals/news/sentiment.
    pub context_max_age_seconds: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            sqlite_path: None,
            hot_capacity: 10_000,
            hot_retention_seconds: 86_400,
            live_timeout_ms: 5_000,
            snapshot_max_age_seconds: 300,
            context_max_age_seconds: 900,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    /// Persist records to SQLite. `None` keeps them in memory only.
    pub sqlite_path: Option<String>,
    /// Embedding dimension shared by every record.
    pub dimension: usize,
    /// How many prior analyses are retrieved per run.
    pub top_k: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            sqlite_path: None,
            dimension: 64,
            top_k: 3,
        }
    }
}

/// Configuration for role agents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentsConfig {
    /// Default model for every role.
    pub model: String,
    /// Per-role timeout in seconds (analyst, trader and risk calls).
    pub role_timeout_seconds: u64,
    pub analysts: Vec<RoleConfig>,
    pub trader: RoleConfig,
    pub risk_roles: Vec<RoleConfig>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-haiku-latest".to_string(),
            role_timeout_seconds: 45,
            analysts: vec![
                RoleConfig::new("market", RoleKind::Market),
                RoleConfig::new("fundamentals", RoleKind::Fundamentals),
                RoleConfig::new("sentiment", RoleKind::Sentiment),
                RoleConfig::new("news", RoleKind::News),
            ],
            trader: RoleConfig::new("trader", RoleKind::Trader),
            risk_roles: vec![
                RoleConfig::new("aggressive", RoleKind::Risk),
                RoleConfig::new("neutral", RoleKind::Risk),
                RoleConfig::new("conservative", RoleKind::Risk),
            ],
        }
    }
}

/// Configuration for a single role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleConfig {
    pub name: String,
    pub kind: RoleKind,
    /// Override model for this role. Falls back to `AgentsConfig::model`.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl RoleConfig {
    pub fn new(name: &str, kind: RoleKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            model: None,
            enabled: true,
        }
    }
}

/// Debate loop bounds and judge weights. Every heuristic threshold lives here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebateConfig {
    /// Round cap `R`. One round is a Bull turn followed by a Bear turn.
    pub max_rounds: u32,
    /// A full round with every turn's confidence delta below this converges.
    pub convergence_delta: Decimal,
    /// Consecutive unrebutted turns that end the debate early.
    pub unrebutted_turns: u32,
    /// Fractional confidence penalty when the round cap is exhausted.
    pub non_convergence_penalty: Decimal,
    /// Weight multiplier per turn of age in the judge's recency weighting.
    pub recency_decay: Decimal,
    /// Judge score bonus at `evidence_cap` citations.
    pub evidence_weight: Decimal,
    pub evidence_cap: u32,
    /// Judge score margin under which the verdict is neutral.
    pub tie_margin: Decimal,
    pub turn_timeout_seconds: u64,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            convergence_delta: Decimal::new(5, 2),
            unrebutted_turns: 2,
            non_convergence_penalty: Decimal::new(25, 2),
            recency_decay: Decimal::new(5, 1),
            evidence_weight: Decimal::new(1, 1),
            evidence_cap: 5,
            tie_margin: Decimal::new(2, 2),
            turn_timeout_seconds: 45,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Outer deadline for a whole run.
    pub deadline_seconds: u64,
    /// One-day drop treated as a crash by the mode controller.
    pub crash_drawdown: Decimal,
    /// Finished runs a service keeps for `get_result` before evicting the oldest.
    pub retained_runs: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            deadline_seconds: 300,
            crash_drawdown: Decimal::new(7, 2),
            retained_runs: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarketDataConfig {
    /// Root directory holding `{SYMBOL}/{YYYY-MM-DD}.json` snapshots.
    pub data_dir: String,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            data_dir: "data/market".to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}
