use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use radar_gateway::ToolGateway;
use radar_models::agent_message::{
    ArgumentResponse, MemoryDigest, OpposingTurn, PlanResponse, RoleRequest, VoteResponse,
};
use radar_models::analysis::{
    DebateOutcome, RoleContribution, RoleKind, Side, TradePlan,
};
use radar_models::mode::Mode;
use radar_models::tool::{resource_keys, Freshness};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AgentError;
use crate::llm::{LanguageModel, PromptContext, Task};
use crate::parser::{parse_argument, parse_plan, parse_role_response, parse_vote};
use crate::prompts::{
    analyst_system_prompt, debater_system_prompt, risk_system_prompt, trader_system_prompt,
};

/// An analyst role. Produces one contribution per run.
#[async_trait]
pub trait RoleAgent: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> RoleKind;

    async fn analyze(&self, request: &RoleRequest) -> Result<RoleContribution, AgentError>;
}

/// One side of the debate.
#[async_trait]
pub trait Debater: Send + Sync {
    fn side(&self) -> Side;

    async fn argue(&self, request: &DebateRequest) -> Result<ArgumentResponse, AgentError>;
}

#[async_trait]
pub trait TraderAgent: Send + Sync {
    fn name(&self) -> &str;

    async fn plan(&self, request: &TraderRequest) -> Result<PlanResponse, AgentError>;
}

#[async_trait]
pub trait RiskAgent: Send + Sync {
    fn name(&self) -> &str;

    async fn vote(&self, request: &RiskRequest) -> Result<VoteResponse, AgentError>;
}

/// Everything a debater sees on its turn.
#[derive(Debug, Clone, Serialize)]
pub struct DebateRequest {
    pub run_id: Uuid,
    pub instrument: String,
    pub as_of: NaiveDate,
    pub side: Side,
    pub round: u32,
    pub contributions: Vec<RoleContribution>,
    pub opponent: Option<OpposingTurn>,
    pub memories: Vec<MemoryDigest>,
    pub mode: Mode,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraderRequest {
    pub run_id: Uuid,
    pub instrument: String,
    pub as_of: NaiveDate,
    pub outcome: DebateOutcome,
    pub contributions: Vec<RoleContribution>,
    pub mode: Mode,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskRequest {
    pub run_id: Uuid,
    pub role: String,
    pub instrument: String,
    pub plan: TradePlan,
    pub outcome: DebateOutcome,
    pub degraded_roles: Vec<String>,
    pub mode: Mode,
}

/// The optional resource an analyst kind consults through the gateway.
pub fn context_resource(kind: RoleKind, instrument: &str) -> Option<String> {
    match kind {
        RoleKind::Fundamentals => Some(resource_keys::fundamentals(instrument)),
        RoleKind::News => Some(resource_keys::news(instrument)),
        RoleKind::Sentiment => Some(resource_keys::sentiment(instrument)),
        RoleKind::Market | RoleKind::Trader | RoleKind::Risk => None,
    }
}

/// Optional tool data attached to an analyst prompt.
#[derive(Debug, Serialize)]
struct ToolData {
    resource_key: String,
    payload: serde_json::Value,
    stale: bool,
}

#[derive(Serialize)]
struct AnalystPrompt<'a> {
    #[serde(flatten)]
    request: &'a RoleRequest,
    tool_data: Option<ToolData>,
}

/// Analyst backed by a language model.
///
/// Fundamentals, news and sentiment analysts fetch their resource through the
/// gateway first. A stale fallback or a missing resource does not fail the
/// role; the contribution is marked degraded instead.
pub struct LlmAnalyst {
    name: String,
    kind: RoleKind,
    model: Arc<dyn LanguageModel>,
    gateway: Option<Arc<ToolGateway>>,
    freshness: Freshness,
    timeout: Duration,
}

impl LlmAnalyst {
    pub fn new(
        name: impl Into<String>,
        kind: RoleKind,
        model: Arc<dyn LanguageModel>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            model,
            gateway: None,
            freshness: Freshness::within_secs(900),
            timeout,
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<ToolGateway>, freshness: Freshness) -> Self {
        self.gateway = Some(gateway);
        self.freshness = freshness;
        self
    }

    /// Returns the tool data (if any) and whether it degrades the contribution.
    async fn consult_gateway(&self, instrument: &str) -> (Option<ToolData>, bool) {
        let (Some(gateway), Some(key)) = (&self.gateway, context_resource(self.kind, instrument))
        else {
            return (None, false);
        };

        match gateway.fetch(&key, self.freshness).await {
            Ok(result) => {
                if result.is_fallback() {
                    warn!(
                        role = %self.name,
                        key = %key,
                        staleness_seconds = result.staleness_seconds,
                        event = "ToolFallbackUsed",
                        "Analyst using stale tool data"
                    );
                }
                let stale = result.stale;
                (
                    Some(ToolData {
                        resource_key: result.resource_key,
                        payload: result.payload,
                        stale,
                    }),
                    stale,
                )
            }
            Err(e) => {
                warn!(role = %self.name, key = %key, error = %e, "Analyst tool data unavailable");
                (None, true)
            }
        }
    }
}

#[async_trait]
impl RoleAgent for LlmAnalyst {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> RoleKind {
        self.kind
    }

    async fn analyze(&self, request: &RoleRequest) -> Result<RoleContribution, AgentError> {
        let start = Instant::now();
        let (tool_data, degraded) = self.consult_gateway(&request.instrument).await;
        let tool_key = tool_data.as_ref().map(|t| t.resource_key.clone());

        let prompt = PromptContext {
            role: self.name.clone(),
            task: Task::Analyze(self.kind),
            mode: request.mode,
            system: analyst_system_prompt(self.kind, request.mode),
            user: serde_json::to_string(&AnalystPrompt { request, tool_data })?,
        };
        let completion = self.model.complete(&prompt, self.timeout).await?;
        let response = parse_role_response(&completion.text)?;

        let mut sources = response.data_sources_consulted;
        if let Some(key) = tool_key {
            if !sources.contains(&key) {
                sources.push(key);
            }
        }

        let contribution =
            RoleContribution::new(&self.name, self.kind, response.rationale, response.confidence)
                .with_signals(response.signals)
                .with_sources(sources)
                .with_elapsed_ms(start.elapsed().as_millis() as u64);
        debug!(role = %self.name, degraded, "Analyst contribution ready");

        Ok(if degraded {
            contribution.into_degraded()
        } else {
            contribution
        })
    }
}

pub struct LlmDebater {
    side: Side,
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl LlmDebater {
    pub fn new(side: Side, model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self {
            side,
            model,
            timeout,
        }
    }
}

#[async_trait]
impl Debater for LlmDebater {
    fn side(&self) -> Side {
        self.side
    }

    async fn argue(&self, request: &DebateRequest) -> Result<ArgumentResponse, AgentError> {
        let prompt = PromptContext {
            role: self.side.to_string(),
            task: Task::Argue(self.side),
            mode: request.mode,
            system: debater_system_prompt(self.side, request.mode),
            user: serde_json::to_string(request)?,
        };
        let completion = self.model.complete(&prompt, self.timeout).await?;
        parse_argument(&completion.text)
    }
}

pub struct LlmTrader {
    name: String,
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl LlmTrader {
    pub fn new(name: impl Into<String>, model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            model,
            timeout,
        }
    }
}

#[async_trait]
impl TraderAgent for LlmTrader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn plan(&self, request: &TraderRequest) -> Result<PlanResponse, AgentError> {
        let prompt = PromptContext {
            role: self.name.clone(),
            task: Task::Plan,
            mode: request.mode,
            system: trader_system_prompt(request.mode),
            user: serde_json::to_string(request)?,
        };
        let completion = self.model.complete(&prompt, self.timeout).await?;
        parse_plan(&completion.text)
    }
}

pub struct LlmRiskAgent {
    name: String,
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl LlmRiskAgent {
    pub fn new(name: impl Into<String>, model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            model,
            timeout,
        }
    }
}

#[async_trait]
impl RiskAgent for LlmRiskAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn vote(&self, request: &RiskRequest) -> Result<VoteResponse, AgentError> {
        let prompt = PromptContext {
            role: self.name.clone(),
            task: Task::Vote,
            mode: request.mode,
            system: risk_system_prompt(&self.name, request.mode),
            user: serde_json::to_string(request)?,
        };
        let completion = self.model.complete(&prompt, self.timeout).await?;
        parse_vote(&completion.text)
    }
}
