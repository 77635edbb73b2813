pub mod agent_message;
pub mod analysis;
pub mod config;
pub mod events;
pub mod memory;
pub mod mode;
pub mod request;
pub mod snapshot;
pub mod tool;

pub use agent_message::{
    ArgumentResponse, MemoryDigest, OpposingTurn, PlanResponse, RoleRequest, RoleResponse,
    VoteResponse,
};
pub use analysis::{
    clamp_unit, merge_contributions, AnalysisState, DebateOutcome, DebateTurn, FailureReason,
    FinalDecision, Phase, RiskBallot, RiskVote, RoleContribution, RoleKind, RunStatus, Side,
    Stance, Termination, TradeAction, TradePlan, DEGRADED_CONFIDENCE_CEILING,
};
pub use config::{
    AgentsConfig, DebateConfig, EngineConfig, GatewayConfig, MarketDataConfig, MemoryConfig,
    RoleConfig, RunConfig,
};
pub use events::LifecycleEvent;
pub use memory::{MemoryMatch, MemoryRecord, Provenance};
pub use mode::{MarketSignal, Mode, ModeDecision, SystemHealth, UserSignal};
pub use request::{AnalysisRequest, ContextBlock, InvalidInput, RunOverrides, RunSignals};
pub use snapshot::{MarketSnapshot, PriceBar};
pub use tool::{resource_keys, Freshness, ToolCallResult, ToolSource};
