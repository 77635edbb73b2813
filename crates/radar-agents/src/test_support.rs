//! Deterministic collaborators for exercising the engine without a real
//! model or market-data provider.
//!
//! `ScriptedModel` answers every task with canned JSON, `StaticMarketData`
//! synthesises a snapshot for any instrument, and `CountingSource` records
//! how often the gateway reached it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use radar_gateway::{
    GatewayError, MarketData, ResourceSource, SnapshotSource, SourceRegistry, ToolCache,
    ToolGateway,
};
use radar_models::agent_message::ArgumentResponse;
use radar_models::analysis::{Phase, RiskVote, Side};
use radar_models::config::EngineConfig;
use radar_models::events::LifecycleEvent;
use radar_models::snapshot::{MarketSnapshot, PriceBar};
use radar_models::tool::resource_keys;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AgentError;
use crate::llm::{Completion, LanguageModel, PromptContext, Task};
use crate::orchestrator::RunObserver;
use crate::roles::{DebateRequest, Debater};

/// How the scripted model argues.
#[derive(Debug, Clone, Copy)]
pub enum DebateScript {
    /// Fixed confidence per side.
    Static { bull: Decimal, bear: Decimal },
    /// Confidence climbs by `step` on every debate turn, whichever side.
    Escalating { start: Decimal, step: Decimal },
}

/// Canned-response language model.
///
/// Analysts answer with confidence 0.65, the trader follows the judged
/// stance, and risk reviewers approve unless told otherwise.
pub struct ScriptedModel {
    debate: DebateScript,
    fail_all: bool,
    failing_roles: Vec<String>,
    votes: HashMap<String, RiskVote>,
    delay: Duration,
    calls: AtomicUsize,
    completions: AtomicUsize,
    argue_calls: AtomicUsize,
}

impl ScriptedModel {
    fn with_script(debate: DebateScript) -> Self {
        Self {
            debate,
            fail_all: false,
            failing_roles: Vec::new(),
            votes: HashMap::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            completions: AtomicUsize::new(0),
            argue_calls: AtomicUsize::new(0),
        }
    }

    pub fn static_debate(bull: Decimal, bear: Decimal) -> Self {
        Self::with_script(DebateScript::Static { bull, bear })
    }

    pub fn escalating(start: Decimal, step: Decimal) -> Self {
        Self::with_script(DebateScript::Escalating { start, step })
    }

    /// Every completion errors.
    pub fn failing() -> Self {
        let mut model = Self::static_debate(Decimal::ZERO, Decimal::ZERO);
        model.fail_all = true;
        model
    }

    /// Completions for this role name error.
    pub fn failing_role(mut self, role: &str) -> Self {
        self.failing_roles.push(role.to_string());
        self
    }

    pub fn with_vote(mut self, role: &str, vote: RiskVote) -> Self {
        self.votes.insert(role.to_string(), vote);
        self
    }

    /// Sleep before answering, to exercise timeouts and deadlines.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Completions that got past the scripted delay.
    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    pub fn argue_calls(&self) -> usize {
        self.argue_calls.load(Ordering::SeqCst)
    }

    fn argument(&self, side: Side) -> serde_json::Value {
        let confidence = match self.debate {
            DebateScript::Static { bull, bear } => match side {
                Side::Bull => bull,
                Side::Bear => bear,
            },
            DebateScript::Escalating { start, step } => {
                let n = self.argue_calls.fetch_add(1, Ordering::SeqCst);
                (start + step * Decimal::from(n as u64)).min(Decimal::ONE)
            }
        };
        if matches!(self.debate, DebateScript::Static { .. }) {
            self.argue_calls.fetch_add(1, Ordering::SeqCst);
        }
        serde_json::json!({
            "argument": format!("{side} case at {confidence}"),
            "confidence": confidence.to_string(),
            "cited_roles": ["market"],
        })
    }

    fn plan(&self, prompt: &PromptContext) -> serde_json::Value {
        let request: serde_json::Value =
            serde_json::from_str(&prompt.user).unwrap_or(serde_json::Value::Null);
        let (action, sizing) = match request["outcome"]["stance"].as_str() {
            Some("bullish") => ("buy", "0.5"),
            Some("bearish") => ("sell", "0.5"),
            _ => ("hold", "0"),
        };
        serde_json::json!({
            "action": action,
            "sizing": sizing,
            "confidence": "0.6",
            "rationale": format!("Scripted {action} plan"),
        })
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        prompt: &PromptContext,
        _timeout: Duration,
    ) -> Result<Completion, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.completions.fetch_add(1, Ordering::SeqCst);
        if self.fail_all || self.failing_roles.contains(&prompt.role) {
            return Err(AgentError::Model(format!(
                "scripted failure for {}",
                prompt.role
            )));
        }

        let body = match prompt.task {
            Task::Analyze(kind) => serde_json::json!({
                "confidence": "0.65",
                "rationale": format!("Scripted {kind:?} view"),
                "signals": {"scripted": true},
            }),
            Task::Argue(side) => self.argument(side),
            Task::Plan => self.plan(prompt),
            Task::Vote => {
                let vote = self
                    .votes
                    .get(&prompt.role)
                    .copied()
                    .unwrap_or(RiskVote::Approve);
                serde_json::json!({
                    "vote": vote,
                    "confidence": "0.7",
                    "rationale": format!("Scripted {vote:?}"),
                })
            }
        };
        Ok(Completion {
            text: format!("```json\n{body}\n```"),
            token_usage: Some(42),
        })
    }
}

/// Debater with a fixed answer, bypassing the model layer.
pub struct StaticDebater {
    side: Side,
    confidence: Decimal,
    concede: bool,
    citations: Vec<String>,
}

impl StaticDebater {
    pub fn new(side: Side, confidence: Decimal) -> Self {
        Self {
            side,
            confidence,
            concede: false,
            citations: Vec::new(),
        }
    }

    pub fn conceding(side: Side) -> Self {
        Self {
            concede: true,
            ..Self::new(side, Decimal::ZERO)
        }
    }

    pub fn citing(mut self, roles: &[&str]) -> Self {
        self.citations = roles.iter().map(|r| r.to_string()).collect();
        self
    }
}

#[async_trait]
impl Debater for StaticDebater {
    fn side(&self) -> Side {
        self.side
    }

    async fn argue(&self, request: &DebateRequest) -> Result<ArgumentResponse, AgentError> {
        Ok(ArgumentResponse {
            argument: format!("{} round {}", self.side, request.round),
            confidence: self.confidence,
            concede: self.concede,
            cited_roles: self.citations.clone(),
            cited_memories: Vec::new(),
        })
    }
}

/// Ten sessions of gently rising closes ending on `as_of`.
pub fn sample_snapshot(instrument: &str, as_of: NaiveDate) -> MarketSnapshot {
    let closes: Vec<Decimal> = (0..10).map(|i| Decimal::from(100 + i)).collect();
    snapshot_from_closes(instrument, as_of, &closes)
}

/// Daily bars with the given closes, the last one dated `as_of`.
pub fn snapshot_from_closes(
    instrument: &str,
    as_of: NaiveDate,
    closes: &[Decimal],
) -> MarketSnapshot {
    let n = closes.len() as u64;
    let prices = closes
        .iter()
        .enumerate()
        .map(|(i, close)| PriceBar {
            date: as_of - chrono::Days::new(n - 1 - i as u64),
            open: *close,
            high: *close + Decimal::ONE,
            low: *close - Decimal::ONE,
            close: *close,
            volume: Decimal::from(1_000_000),
        })
        .collect();
    MarketSnapshot {
        instrument: instrument.to_string(),
        as_of,
        prices,
        fundamentals: serde_json::json!({"pe": 18.5, "revenue_growth": 0.08}),
        freshness: Utc
            .with_ymd_and_hms(2024, 1, 2, 21, 0, 0)
            .single()
            .unwrap_or_else(Utc::now),
    }
}

/// Market data that synthesises a snapshot for any instrument and date.
#[derive(Clone, Default)]
pub struct StaticMarketData {
    closes: Option<Vec<Decimal>>,
    calls: Arc<AtomicUsize>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_closes(closes: Vec<Decimal>) -> Self {
        Self {
            closes: Some(closes),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketData for StaticMarketData {
    async fn snapshot(
        &self,
        instrument: &str,
        as_of: NaiveDate,
    ) -> Result<MarketSnapshot, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match &self.closes {
            Some(closes) => snapshot_from_closes(instrument, as_of, closes),
            None => sample_snapshot(instrument, as_of),
        })
    }
}

/// Market data with nothing to offer.
#[derive(Clone, Default)]
pub struct UnavailableMarketData;

#[async_trait]
impl MarketData for UnavailableMarketData {
    async fn snapshot(
        &self,
        instrument: &str,
        as_of: NaiveDate,
    ) -> Result<MarketSnapshot, GatewayError> {
        Err(GatewayError::data_unavailable(
            resource_keys::snapshot(instrument, as_of),
            "no market data",
        ))
    }
}

/// Resource source that counts calls and answers with a small payload.
pub struct CountingSource {
    name: String,
    fail: bool,
    calls: AtomicUsize,
}

impl CountingSource {
    pub fn new(prefix: &str) -> Self {
        Self {
            name: format!("counting_{prefix}"),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(prefix: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(prefix)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceSource for CountingSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, key: &str) -> Result<serde_json::Value, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(GatewayError::source(key, "scripted outage"));
        }
        Ok(serde_json::json!({ "key": key, "items": ["steady demand"] }))
    }
}

/// Handles to the context sources wired by [`test_gateway`].
pub struct TestSources {
    pub fundamentals: Arc<CountingSource>,
    pub news: Arc<CountingSource>,
    pub sentiment: Arc<CountingSource>,
}

/// In-memory gateway with `market` behind snapshot keys and counting
/// sources for fundamentals, news and sentiment.
pub fn test_gateway<M: MarketData + 'static>(market: M) -> (Arc<ToolGateway>, TestSources) {
    let sources = TestSources {
        fundamentals: Arc::new(CountingSource::new(resource_keys::FUNDAMENTALS)),
        news: Arc::new(CountingSource::new(resource_keys::NEWS)),
        sentiment: Arc::new(CountingSource::new(resource_keys::SENTIMENT)),
    };

    let mut registry = SourceRegistry::new();
    let routes: [(&str, Arc<dyn ResourceSource>); 4] = [
        (resource_keys::SNAPSHOT, Arc::new(SnapshotSource::new(market))),
        (resource_keys::FUNDAMENTALS, sources.fundamentals.clone()),
        (resource_keys::NEWS, sources.news.clone()),
        (resource_keys::SENTIMENT, sources.sentiment.clone()),
    ];
    for (prefix, source) in routes {
        if let Err(e) = registry.register(prefix, source) {
            panic!("test registry: {e}");
        }
    }

    let gateway = ToolGateway::new(
        ToolCache::in_memory(1_000, Duration::from_secs(3600)),
        registry,
        Duration::from_millis(500),
    );
    (Arc::new(gateway), sources)
}

/// Engine config with short timeouts for tests.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.agents.role_timeout_seconds = 2;
    config.debate.turn_timeout_seconds = 2;
    config.run.deadline_seconds = 10;
    config.gateway.live_timeout_ms = 500;
    config.memory.dimension = 32;
    config
}

/// Observer that keeps every phase entry and event.
#[derive(Default)]
pub struct RecordingObserver {
    pub phases: Mutex<Vec<Phase>>,
    pub events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingObserver {
    pub fn phases(&self) -> Vec<Phase> {
        self.phases.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl RunObserver for RecordingObserver {
    fn phase_entered(&self, _run_id: Uuid, phase: Phase) {
        if let Ok(mut phases) = self.phases.lock() {
            phases.push(phase);
        }
    }

    fn event(&self, event: &LifecycleEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
