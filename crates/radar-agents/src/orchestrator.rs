use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use radar_gateway::ToolGateway;
use radar_memory::{Embedder, MemoryError, MemoryStore};
use radar_models::agent_message::{MemoryDigest, RoleRequest};
use radar_models::analysis::{
    clamp_unit, merge_contributions, AnalysisState, DebateOutcome, FailureReason, FinalDecision,
    Phase, RiskBallot, RiskVote, RoleContribution, RoleKind, RunStatus, Side, TradeAction,
    TradePlan,
};
use radar_models::config::EngineConfig;
use radar_models::events::LifecycleEvent;
use radar_models::memory::{MemoryMatch, MemoryRecord, Provenance};
use radar_models::mode::{MarketSignal, ModeDecision};
use radar_models::request::AnalysisRequest;
use radar_models::snapshot::MarketSnapshot;
use radar_models::tool::{resource_keys, Freshness};
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::debate::{DebateCoordinator, DebateInput};
use crate::error::AgentError;
use crate::llm::LanguageModel;
use crate::mode::ModeController;
use crate::roles::{
    Debater, LlmAnalyst, LlmDebater, LlmRiskAgent, LlmTrader, RiskAgent, RiskRequest, RoleAgent,
    TraderAgent, TraderRequest,
};

/// Weight of the analyst mean in the final confidence.
const ANALYST_WEIGHT: Decimal = Decimal::from_parts(3, 0, 0, false, 1);
/// Weight of the debate confidence in the final confidence.
const DEBATE_WEIGHT: Decimal = Decimal::from_parts(4, 0, 0, false, 1);
/// Weight of risk support in the final confidence.
const RISK_WEIGHT: Decimal = Decimal::from_parts(3, 0, 0, false, 1);
/// Sizing used when the trader fails and the plan is derived from the stance.
const FALLBACK_SIZING: Decimal = Decimal::from_parts(25, 0, 0, false, 2);

/// Receives progress from a run as it happens.
pub trait RunObserver: Send + Sync {
    fn phase_entered(&self, run_id: Uuid, phase: Phase);
    fn event(&self, event: &LifecycleEvent);
}

pub struct NoopObserver;

impl RunObserver for NoopObserver {
    fn phase_entered(&self, _run_id: Uuid, _phase: Phase) {}
    fn event(&self, _event: &LifecycleEvent) {}
}

/// A finished run plus the memory write it scheduled, if it decided.
pub struct RunOutcome {
    pub state: AnalysisState,
    pub pending_memory: Option<JoinHandle<Result<Uuid, MemoryError>>>,
}

/// Every agent a run talks to.
pub struct RoleRoster {
    pub analysts: Vec<Arc<dyn RoleAgent>>,
    pub bull: Arc<dyn Debater>,
    pub bear: Arc<dyn Debater>,
    pub trader: Arc<dyn TraderAgent>,
    pub risk: Vec<Arc<dyn RiskAgent>>,
}

impl RoleRoster {
    /// Build LLM-backed agents for every enabled role. `model_for` maps a
    /// model name to a backend.
    pub fn from_config<F>(config: &EngineConfig, gateway: Arc<ToolGateway>, model_for: F) -> Self
    where
        F: Fn(&str) -> Arc<dyn LanguageModel>,
    {
        let agents = &config.agents;
        let role_timeout = Duration::from_secs(agents.role_timeout_seconds);
        let turn_timeout = Duration::from_secs(config.debate.turn_timeout_seconds);
        let context_freshness = Freshness::within_secs(config.gateway.context_max_age_seconds);
        let model = |role_model: &Option<String>| {
            model_for(role_model.as_deref().unwrap_or(&agents.model))
        };

        let analysts = agents
            .analysts
            .iter()
            .filter(|role| role.enabled)
            .map(|role| {
                Arc::new(
                    LlmAnalyst::new(&role.name, role.kind, model(&role.model), role_timeout)
                        .with_gateway(Arc::clone(&gateway), context_freshness),
                ) as Arc<dyn RoleAgent>
            })
            .collect();

        let risk = agents
            .risk_roles
            .iter()
            .filter(|role| role.enabled)
            .map(|role| {
                Arc::new(LlmRiskAgent::new(&role.name, model(&role.model), role_timeout))
                    as Arc<dyn RiskAgent>
            })
            .collect();

        Self {
            analysts,
            bull: Arc::new(LlmDebater::new(Side::Bull, model(&None), turn_timeout)),
            bear: Arc::new(LlmDebater::new(Side::Bear, model(&None), turn_timeout)),
            trader: Arc::new(LlmTrader::new(
                &agents.trader.name,
                model(&agents.trader.model),
                role_timeout,
            )),
            risk,
        }
    }

    /// Every role on the same backend.
    pub fn with_model(
        config: &EngineConfig,
        gateway: Arc<ToolGateway>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self::from_config(config, gateway, |_| Arc::clone(&model))
    }
}

/// Sequences one analysis run through the phase graph:
/// Init → AnalystPhase → DebatePhase → RiskPhase → Decision → Terminal,
/// with any phase able to fail the run.
pub struct Orchestrator {
    gateway: Arc<ToolGateway>,
    memory: Arc<MemoryStore>,
    embedder: Arc<dyn Embedder>,
    roster: RoleRoster,
    debate: DebateCoordinator,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<ToolGateway>,
        memory: Arc<MemoryStore>,
        embedder: Arc<dyn Embedder>,
        roster: RoleRoster,
        config: EngineConfig,
    ) -> Self {
        let debate = DebateCoordinator::new(
            Arc::clone(&roster.bull),
            Arc::clone(&roster.bear),
            config.debate.clone(),
        );
        Self {
            gateway,
            memory,
            embedder,
            roster,
            debate,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    /// Run to completion and wait for the memory write, so the returned
    /// state carries its memory backlink.
    pub async fn run(&self, request: &AnalysisRequest) -> AnalysisState {
        let RunOutcome {
            mut state,
            pending_memory,
        } = self.execute(request, &NoopObserver).await;

        if let Some(handle) = pending_memory {
            match handle.await {
                Ok(Ok(record_id)) => state.attach_memory_record(record_id),
                Ok(Err(e)) => warn!(run_id = %state.run_id, error = %e, "Memory append failed"),
                Err(e) => error!(run_id = %state.run_id, error = %e, "Memory append task panicked"),
            }
        }
        state
    }

    pub async fn execute(&self, request: &AnalysisRequest, observer: &dyn RunObserver) -> RunOutcome {
        self.execute_cancellable(request, observer, CancellationToken::new())
            .await
    }

    /// Run under the outer deadline until it finishes or `cancel` fires.
    pub async fn execute_cancellable(
        &self,
        request: &AnalysisRequest,
        observer: &dyn RunObserver,
        cancel: CancellationToken,
    ) -> RunOutcome {
        let start = Instant::now();
        let mut state = AnalysisState::new(request.id, &request.instrument, request.as_of);
        let run_id = state.run_id;
        info!(run_id = %run_id, instrument = %request.instrument, as_of = %request.as_of, "Run started");
        observer.event(&LifecycleEvent::Started { run_id });

        let deadline = Duration::from_secs(self.config.run.deadline_seconds);
        let finished = tokio::select! {
            result = tokio::time::timeout(deadline, self.drive(request, &mut state, observer)) => Some(result),
            _ = cancel.cancelled() => None,
        };

        let mut pending_memory = None;
        match finished {
            Some(Ok(Ok(record))) => {
                let memory = Arc::clone(&self.memory);
                pending_memory = Some(tokio::task::spawn_blocking(move || memory.append(record)));
            }
            Some(Ok(Err(reason))) => state.fail(reason),
            Some(Err(_)) => {
                warn!(run_id = %run_id, phase = %state.phase, deadline_secs = deadline.as_secs(), "Run deadline exceeded");
                if !state.is_sealed() {
                    state.incomplete = true;
                }
                state.fail(FailureReason::DeadlineExceeded);
            }
            None => {
                warn!(run_id = %run_id, phase = %state.phase, "Run cancelled");
                if !state.is_sealed() {
                    state.incomplete = true;
                }
                state.fail(FailureReason::Cancelled);
            }
        }

        observer.phase_entered(run_id, state.phase);
        match (&state.status, &state.failure) {
            (RunStatus::Decided, _) => {
                info!(
                    run_id = %run_id,
                    action = ?state.decision.as_ref().map(|d| d.action),
                    confidence = ?state.decision.as_ref().map(|d| d.confidence),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Run decided"
                );
                observer.event(&LifecycleEvent::DecisionReady { run_id });
            }
            (_, Some(reason)) => {
                info!(run_id = %run_id, reason = %reason, elapsed_ms = start.elapsed().as_millis() as u64, "Run failed");
                observer.event(&LifecycleEvent::Failed {
                    run_id,
                    reason: reason.clone(),
                });
            }
            _ => {}
        }

        RunOutcome {
            state,
            pending_memory,
        }
    }

    /// The phase graph. Returns the memory record to append once the state
    /// is decided.
    async fn drive(
        &self,
        request: &AnalysisRequest,
        state: &mut AnalysisState,
        observer: &dyn RunObserver,
    ) -> Result<MemoryRecord, FailureReason> {
        let run_id = state.run_id;

        // Init
        enter(state, observer, Phase::Init);
        request
            .validate()
            .map_err(|e| FailureReason::Internal(format!("invalid request: {e}")))?;

        let snapshot = self.fetch_snapshot(request).await?;
        let market = MarketSignal::classify(&snapshot, self.config.run.crash_drawdown);
        let mode = ModeController::decide(request.signals.user, market, request.signals.system_health);
        info!(run_id = %run_id, mode = ?mode.mode, signals = ?mode.signals, "Mode selected");
        state.mode = Some(mode.clone());

        let context = snapshot.summary();
        let embedding = self.embedder.embed(&context);
        let memories = self.recall(run_id, &embedding);
        complete(state, observer, Phase::Init);

        // AnalystPhase
        enter(state, observer, Phase::AnalystPhase);
        let analysts = self
            .run_analysts(request, state, &snapshot, &memories, &mode)
            .await;
        for contribution in analysts.values() {
            state.record_contribution(contribution.clone());
        }
        complete(state, observer, Phase::AnalystPhase);

        // DebatePhase
        enter(state, observer, Phase::DebatePhase);
        let input = DebateInput {
            run_id,
            instrument: request.instrument.clone(),
            as_of: request.as_of,
            contributions: analysts.clone(),
            mode: mode.mode,
            max_rounds: request
                .max_rounds_override()
                .unwrap_or(self.config.debate.max_rounds),
        };
        let debate = self.debate.run(&input, &memories).await.map_err(|e| {
            warn!(run_id = %run_id, error = %e, "Debate failed");
            FailureReason::DebateFailure
        })?;
        state.debate = debate.history;
        state.debate_outcome = Some(debate.outcome.clone());
        complete(state, observer, Phase::DebatePhase);

        // RiskPhase
        enter(state, observer, Phase::RiskPhase);
        let plan = self
            .plan_trade(request, state, &debate.outcome, &analysts, &mode)
            .await;
        state.trade_plan = Some(plan.clone());
        self.collect_votes(request, state, &plan, &debate.outcome, &mode)
            .await;
        let verdict = tally_votes(state.risk_votes.values());
        info!(run_id = %run_id, verdict = ?verdict, ballots = state.risk_votes.len(), "Risk review complete");
        complete(state, observer, Phase::RiskPhase);

        // Decision
        enter(state, observer, Phase::Decision);
        let decision = assemble_decision(&plan, &debate.outcome, &analysts, verdict);
        let source_text = format!(
            "{context}. Decision: {:?} sizing {} confidence {}. {}",
            decision.action, decision.sizing_hint, decision.confidence, debate.outcome.synthesis
        );
        state.decide(decision);
        complete(state, observer, Phase::Decision);

        Ok(MemoryRecord::new(
            embedding,
            source_text,
            Provenance {
                run_id,
                instrument: request.instrument.clone(),
                as_of: request.as_of,
            },
        ))
    }

    async fn fetch_snapshot(
        &self,
        request: &AnalysisRequest,
    ) -> Result<Arc<MarketSnapshot>, FailureReason> {
        let key = resource_keys::snapshot(&request.instrument, request.as_of);
        let freshness = Freshness::within_secs(self.config.gateway.snapshot_max_age_seconds);
        match self.gateway.fetch_as::<MarketSnapshot>(&key, freshness).await {
            Ok((snapshot, result)) => {
                if result.is_fallback() {
                    warn!(
                        key = %key,
                        staleness_seconds = result.staleness_seconds,
                        event = "ToolFallbackUsed",
                        "Using stale market snapshot"
                    );
                }
                Ok(Arc::new(snapshot))
            }
            Err(e) => {
                warn!(run_id = %request.id, key = %key, error = %e, "Market snapshot unavailable");
                Err(FailureReason::DataUnavailable)
            }
        }
    }

    /// Top-k prior analyses. A memory failure leaves the run without context.
    fn recall(&self, run_id: Uuid, embedding: &[f32]) -> Vec<MemoryMatch> {
        match self.memory.query(embedding, self.config.memory.top_k) {
            Ok(matches) => matches.collect(),
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Memory query failed, continuing without context");
                Vec::new()
            }
        }
    }

    async fn run_analysts(
        &self,
        request: &AnalysisRequest,
        state: &AnalysisState,
        snapshot: &Arc<MarketSnapshot>,
        memories: &[MemoryMatch],
        mode: &ModeDecision,
    ) -> BTreeMap<String, RoleContribution> {
        let role_timeout = Duration::from_secs(self.config.agents.role_timeout_seconds);
        let digests: Vec<MemoryDigest> = memories.iter().map(MemoryDigest::from).collect();

        // Dropping the handles (deadline or cancellation) aborts the role tasks
        let mut handles = Vec::new();
        for analyst in &self.roster.analysts {
            let agent = Arc::clone(analyst);
            let role_request = RoleRequest {
                request_id: Uuid::new_v4(),
                run_id: state.run_id,
                role: agent.name().to_string(),
                kind: agent.kind(),
                instrument: request.instrument.clone(),
                as_of: request.as_of,
                snapshot: snapshot.as_ref().clone(),
                memories: digests.clone(),
                extra_context: request.extra_context.clone(),
                mode: mode.mode,
            };
            let name = agent.name().to_string();
            let kind = agent.kind();

            handles.push((
                name,
                kind,
                AbortOnDropHandle::new(tokio::spawn(async move {
                    let started = Instant::now();
                    let result = tokio::time::timeout(role_timeout, agent.analyze(&role_request)).await;
                    (result, started.elapsed())
                })),
            ));
        }

        let mut merged = BTreeMap::new();
        for (name, kind, handle) in handles {
            let contribution = match handle.await {
                Ok((Ok(Ok(contribution)), elapsed)) => {
                    info!(
                        role = %name,
                        confidence = %contribution.confidence,
                        degraded = contribution.degraded,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Analyst succeeded"
                    );
                    contribution
                }
                Ok((Ok(Err(e)), elapsed)) => {
                    warn!(role = %name, error = %e, elapsed_ms = elapsed.as_millis() as u64, "Analyst failed");
                    RoleContribution::failed(&name, kind, e)
                        .with_elapsed_ms(elapsed.as_millis() as u64)
                }
                Ok((Err(_), elapsed)) => {
                    warn!(role = %name, timeout_secs = role_timeout.as_secs(), "Analyst timed out");
                    RoleContribution::failed(&name, kind, AgentError::Timeout(role_timeout.as_secs()))
                        .with_elapsed_ms(elapsed.as_millis() as u64)
                }
                Err(e) => {
                    error!(role = %name, error = %e, "Analyst task panicked");
                    RoleContribution::failed(&name, kind, format!("task panicked: {e}"))
                }
            };
            merged = merge_contributions(
                merged,
                BTreeMap::from([(contribution.role.clone(), contribution)]),
            );
        }
        merged
    }

    async fn plan_trade(
        &self,
        request: &AnalysisRequest,
        state: &mut AnalysisState,
        outcome: &DebateOutcome,
        analysts: &BTreeMap<String, RoleContribution>,
        mode: &ModeDecision,
    ) -> TradePlan {
        let trader = &self.roster.trader;
        let role_timeout = Duration::from_secs(self.config.agents.role_timeout_seconds);
        let trader_request = TraderRequest {
            run_id: state.run_id,
            instrument: request.instrument.clone(),
            as_of: request.as_of,
            outcome: outcome.clone(),
            contributions: analysts.values().cloned().collect(),
            mode: mode.mode,
        };

        let failure = match tokio::time::timeout(role_timeout, trader.plan(&trader_request)).await {
            Ok(Ok(response)) => {
                let sizing = if response.action == TradeAction::Hold {
                    Decimal::ZERO
                } else {
                    clamp_unit(response.sizing)
                };
                info!(role = %trader.name(), action = ?response.action, %sizing, "Trader planned");
                state.record_contribution(RoleContribution::new(
                    trader.name(),
                    RoleKind::Trader,
                    response.rationale.clone(),
                    response.confidence,
                ));
                return TradePlan {
                    action: response.action,
                    sizing,
                    rationale: response.rationale,
                };
            }
            Ok(Err(e)) => e,
            Err(_) => AgentError::Timeout(role_timeout.as_secs()),
        };

        warn!(role = %trader.name(), error = %failure, "Trader failed, deriving plan from debate stance");
        state.record_contribution(RoleContribution::failed(
            trader.name(),
            RoleKind::Trader,
            &failure,
        ));
        fallback_plan(outcome)
    }

    async fn collect_votes(
        &self,
        request: &AnalysisRequest,
        state: &mut AnalysisState,
        plan: &TradePlan,
        outcome: &DebateOutcome,
        mode: &ModeDecision,
    ) {
        let role_timeout = Duration::from_secs(self.config.agents.role_timeout_seconds);
        let degraded_roles: Vec<String> =
            state.degraded_roles().into_iter().map(String::from).collect();

        for agent in &self.roster.risk {
            let name = agent.name().to_string();
            let risk_request = RiskRequest {
                run_id: state.run_id,
                role: name.clone(),
                instrument: request.instrument.clone(),
                plan: plan.clone(),
                outcome: outcome.clone(),
                degraded_roles: degraded_roles.clone(),
                mode: mode.mode,
            };

            let ballot = match tokio::time::timeout(role_timeout, agent.vote(&risk_request)).await {
                Ok(Ok(response)) => {
                    info!(role = %name, vote = ?response.vote, "Risk vote cast");
                    RiskBallot {
                        role: name.clone(),
                        vote: response.vote,
                        rationale: response.rationale,
                        degraded: false,
                    }
                }
                failed => {
                    let reason = match failed {
                        Ok(Err(e)) => e,
                        _ => AgentError::Timeout(role_timeout.as_secs()),
                    };
                    warn!(role = %name, error = %reason, "Risk agent failed, abstaining");
                    state.record_contribution(RoleContribution::failed(
                        &name,
                        RoleKind::Risk,
                        &reason,
                    ));
                    RiskBallot {
                        role: name.clone(),
                        vote: RiskVote::Reject,
                        rationale: format!("Abstained: {reason}"),
                        degraded: true,
                    }
                }
            };
            state.risk_votes.insert(name, ballot);
        }
    }
}

fn enter(state: &mut AnalysisState, observer: &dyn RunObserver, phase: Phase) {
    state.enter(phase);
    info!(run_id = %state.run_id, phase = %phase, "Entering phase");
    observer.phase_entered(state.run_id, phase);
}

fn complete(state: &AnalysisState, observer: &dyn RunObserver, phase: Phase) {
    observer.event(&LifecycleEvent::PhaseCompleted {
        run_id: state.run_id,
        phase,
    });
}

/// Majority of the counted ballots. Ties go to the most conservative vote;
/// with nothing counted the plan is rejected.
pub fn tally_votes<'a>(ballots: impl IntoIterator<Item = &'a RiskBallot>) -> RiskVote {
    let mut counts: BTreeMap<RiskVote, usize> = BTreeMap::new();
    for ballot in ballots.into_iter().filter(|b| !b.degraded) {
        *counts.entry(ballot.vote).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(vote_a, count_a), (vote_b, count_b)| {
            count_a.cmp(count_b).then(vote_a.cmp(vote_b))
        })
        .map(|(vote, _)| vote)
        .unwrap_or(RiskVote::Reject)
}

/// Plan used when the trader cannot produce one.
pub fn fallback_plan(outcome: &DebateOutcome) -> TradePlan {
    let action = TradeAction::from(outcome.stance);
    let sizing = if action == TradeAction::Hold {
        Decimal::ZERO
    } else {
        FALLBACK_SIZING
    };
    TradePlan {
        action,
        sizing,
        rationale: format!(
            "Trader unavailable; {:?} plan derived from the debate stance.",
            action
        ),
    }
}

/// Apply the risk verdict to the plan and blend the final confidence.
pub fn assemble_decision(
    plan: &TradePlan,
    outcome: &DebateOutcome,
    analysts: &BTreeMap<String, RoleContribution>,
    verdict: RiskVote,
) -> FinalDecision {
    let (action, sizing_hint, support) = match verdict {
        RiskVote::Approve => (plan.action, plan.sizing, Decimal::ONE),
        RiskVote::Modify => (plan.action, plan.sizing / Decimal::TWO, Decimal::new(5, 1)),
        RiskVote::Reject => (TradeAction::Hold, Decimal::ZERO, Decimal::ZERO),
    };
    let sizing_hint = if action == TradeAction::Hold {
        Decimal::ZERO
    } else {
        sizing_hint
    };

    let analyst_mean = if analysts.is_empty() {
        Decimal::ZERO
    } else {
        analysts.values().map(|c| c.confidence).sum::<Decimal>()
            / Decimal::from(analysts.len() as u64)
    };
    let confidence = clamp_unit(
        ANALYST_WEIGHT * analyst_mean + DEBATE_WEIGHT * outcome.confidence + RISK_WEIGHT * support,
    )
    .round_dp(4);

    let rationale = match verdict {
        RiskVote::Approve => plan.rationale.clone(),
        RiskVote::Modify => format!("{} Risk review halved the size.", plan.rationale),
        RiskVote::Reject => format!(
            "Risk review rejected the {:?} plan; standing aside.",
            plan.action
        ),
    };

    FinalDecision {
        action,
        sizing_hint,
        rationale,
        confidence,
        risk_verdict: verdict,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radar_models::analysis::{Stance, Termination};
    use rust_decimal_macros::dec;

    fn ballot(role: &str, vote: RiskVote) -> RiskBallot {
        RiskBallot {
            role: role.to_string(),
            vote,
            rationale: String::new(),
            degraded: false,
        }
    }

    fn outcome(stance: Stance, confidence: Decimal) -> DebateOutcome {
        DebateOutcome {
            stance,
            synthesis: "synthesis".to_string(),
            confidence,
            rounds: 1,
            non_convergent: false,
            termination: Termination::Converged,
        }
    }

    fn plan(action: TradeAction, sizing: Decimal) -> TradePlan {
        TradePlan {
            action,
            sizing,
            rationale: "plan".to_string(),
        }
    }

    #[test]
    fn majority_wins() {
        let ballots = [
            ballot("a", RiskVote::Approve),
            ballot("b", RiskVote::Approve),
            ballot("c", RiskVote::Reject),
        ];
        assert_eq!(tally_votes(&ballots), RiskVote::Approve);
    }

    #[test]
    fn ties_go_to_the_most_conservative_vote() {
        let ballots = [ballot("a", RiskVote::Approve), ballot("b", RiskVote::Modify)];
        assert_eq!(tally_votes(&ballots), RiskVote::Modify);

        let ballots = [
            ballot("a", RiskVote::Approve),
            ballot("b", RiskVote::Modify),
            ballot("c", RiskVote::Reject),
        ];
        assert_eq!(tally_votes(&ballots), RiskVote::Reject);
    }

    #[test]
    fn abstentions_do_not_count() {
        let mut abstained = ballot("c", RiskVote::Reject);
        abstained.degraded = true;
        let ballots = [ballot("a", RiskVote::Approve), abstained.clone()];
        assert_eq!(tally_votes(&ballots), RiskVote::Approve);

        assert_eq!(tally_votes(&[abstained]), RiskVote::Reject);
        assert_eq!(tally_votes(&[] as &[RiskBallot]), RiskVote::Reject);
    }

    #[test]
    fn verdict_shapes_the_decision() {
        let analysts = BTreeMap::from([(
            "market".to_string(),
            RoleContribution::new("market", RoleKind::Market, "up", dec!(0.6)),
        )]);
        let debate = outcome(Stance::Bullish, dec!(0.5));
        let buy = plan(TradeAction::Buy, dec!(0.5));

        let approved = assemble_decision(&buy, &debate, &analysts, RiskVote::Approve);
        assert_eq!(approved.action, TradeAction::Buy);
        assert_eq!(approved.sizing_hint, dec!(0.5));
        // 0.3 * 0.6 + 0.4 * 0.5 + 0.3 * 1
        assert_eq!(approved.confidence, dec!(0.68));

        let modified = assemble_decision(&buy, &debate, &analysts, RiskVote::Modify);
        assert_eq!(modified.sizing_hint, dec!(0.25));
        assert_eq!(modified.confidence, dec!(0.53));

        let rejected = assemble_decision(&buy, &debate, &analysts, RiskVote::Reject);
        assert_eq!(rejected.action, TradeAction::Hold);
        assert_eq!(rejected.sizing_hint, Decimal::ZERO);
        assert_eq!(rejected.confidence, dec!(0.38));
    }

    #[test]
    fn fallback_plan_follows_stance() {
        let bearish = fallback_plan(&outcome(Stance::Bearish, dec!(0.6)));
        assert_eq!(bearish.action, TradeAction::Sell);
        assert_eq!(bearish.sizing, dec!(0.25));

        let neutral = fallback_plan(&outcome(Stance::Neutral, dec!(0.6)));
        assert_eq!(neutral.action, TradeAction::Hold);
        assert_eq!(neutral.sizing, Decimal::ZERO);
    }
}
