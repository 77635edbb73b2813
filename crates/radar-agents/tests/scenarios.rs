//! End-to-end runs of the orchestration graph against scripted agents.
//!
//! Every test builds an in-memory gateway (synthetic market data plus
//! counting context sources), an in-memory memory store and a
//! `ScriptedModel` shared by every role, then drives a full run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use radar_agents::test_support::{
    test_config, test_gateway, RecordingObserver, ScriptedModel, StaticMarketData,
    UnavailableMarketData,
};
use radar_agents::{Orchestrator, RoleRoster};
use radar_gateway::MarketData;
use radar_memory::{HashingEmbedder, MemoryStore};
use radar_models::analysis::{
    merge_contributions, FailureReason, Phase, RiskVote, RoleContribution, RoleKind, RunStatus,
    Stance, TradeAction,
};
use radar_models::config::EngineConfig;
use radar_models::events::LifecycleEvent;
use radar_models::request::{AnalysisRequest, RunOverrides};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

struct Engine {
    orchestrator: Orchestrator,
    memory: Arc<MemoryStore>,
    model: Arc<ScriptedModel>,
}

fn engine_with<M: MarketData + 'static>(
    market: M,
    model: ScriptedModel,
    config: EngineConfig,
) -> Engine {
    let model = Arc::new(model);
    let (gateway, _sources) = test_gateway(market);
    let memory = Arc::new(MemoryStore::in_memory(config.memory.dimension));
    let embedder = Arc::new(HashingEmbedder::new(config.memory.dimension));
    let roster = RoleRoster::with_model(&config, Arc::clone(&gateway), model.clone());
    Engine {
        orchestrator: Orchestrator::new(gateway, Arc::clone(&memory), embedder, roster, config),
        memory,
        model,
    }
}

fn engine(model: ScriptedModel) -> Engine {
    engine_with(StaticMarketData::new(), model, test_config())
}

fn test1() -> AnalysisRequest {
    AnalysisRequest::new("TEST1", NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
}

#[tokio::test]
async fn static_debate_converges_in_one_round() {
    let engine = engine(ScriptedModel::static_debate(dec!(0.6), dec!(0.6)));
    let state = engine.orchestrator.run(&test1()).await;

    assert_eq!(state.status, RunStatus::Decided);
    assert_eq!(state.phase, Phase::Terminal);
    assert!(!state.incomplete);

    let outcome = state.debate_outcome.as_ref().unwrap();
    assert_eq!(outcome.rounds, 1);
    assert!(!outcome.non_convergent);
    assert_eq!(outcome.stance, Stance::Neutral);
    assert_eq!(outcome.confidence, dec!(0.6));

    // Four analysts plus the trader
    assert_eq!(state.contributions.len(), 5);
    assert!(state.contributions.values().all(|c| !c.degraded));

    let decision = state.decision.as_ref().unwrap();
    assert_eq!(decision.action, TradeAction::Hold);
    assert_eq!(decision.sizing_hint, Decimal::ZERO);
    assert_eq!(decision.risk_verdict, RiskVote::Approve);
    // 0.3 * 0.65 + 0.4 * 0.6 + 0.3 * 1
    assert_eq!(decision.confidence, dec!(0.735));
    assert!(state.finished_at.is_some());
}

#[tokio::test]
async fn escalating_debate_exhausts_the_round_cap() {
    let convergent = engine(ScriptedModel::static_debate(dec!(0.6), dec!(0.6)))
        .orchestrator
        .run(&test1())
        .await;
    let escalating = engine(ScriptedModel::escalating(dec!(0.2), dec!(0.1)))
        .orchestrator
        .run(&test1())
        .await;

    assert_eq!(escalating.status, RunStatus::Decided);
    let outcome = escalating.debate_outcome.as_ref().unwrap();
    assert_eq!(outcome.rounds, test_config().debate.max_rounds);
    assert!(outcome.non_convergent);

    let convergent_confidence = convergent.debate_outcome.as_ref().unwrap().confidence;
    assert!(outcome.confidence < convergent_confidence);
}

#[tokio::test]
async fn missing_market_data_fails_before_any_agent_runs() {
    let engine = engine_with(
        UnavailableMarketData,
        ScriptedModel::static_debate(dec!(0.6), dec!(0.6)),
        test_config(),
    );
    let observer = RecordingObserver::default();
    let outcome = engine.orchestrator.execute(&test1(), &observer).await;

    assert_eq!(outcome.state.status, RunStatus::Failed);
    assert_eq!(outcome.state.failure, Some(FailureReason::DataUnavailable));
    assert!(outcome.state.contributions.is_empty());
    assert!(outcome.state.decision.is_none());
    assert!(outcome.pending_memory.is_none());
    assert_eq!(engine.model.calls(), 0);
    assert!(engine.memory.is_empty().unwrap());
    assert!(matches!(
        observer.events().last(),
        Some(LifecycleEvent::Failed {
            reason: FailureReason::DataUnavailable,
            ..
        })
    ));
}

#[tokio::test]
async fn round_count_never_exceeds_the_override() {
    for max_rounds in 1..=4 {
        let engine = engine(ScriptedModel::escalating(dec!(0.1), dec!(0.1)));
        let mut request = test1();
        request.overrides = Some(RunOverrides {
            max_rounds: Some(max_rounds),
        });
        let state = engine.orchestrator.run(&request).await;

        let outcome = state.debate_outcome.as_ref().unwrap();
        assert_eq!(outcome.rounds, max_rounds);
        assert!(state.debate.iter().all(|turn| turn.round <= max_rounds));
        assert!(state
            .debate
            .windows(2)
            .all(|pair| (pair[0].round, pair[0].seq) < (pair[1].round, pair[1].seq)));
    }
}

#[test]
fn merge_is_order_independent() {
    let parts: Vec<BTreeMap<String, RoleContribution>> = [
        ("market", RoleKind::Market, dec!(0.7)),
        ("fundamentals", RoleKind::Fundamentals, dec!(0.4)),
        ("sentiment", RoleKind::Sentiment, dec!(0.55)),
        ("news", RoleKind::News, dec!(0.2)),
    ]
    .into_iter()
    .map(|(role, kind, confidence)| {
        BTreeMap::from([(
            role.to_string(),
            RoleContribution::new(role, kind, format!("{role} view"), confidence),
        )])
    })
    .collect();

    let fold = |order: &[usize]| {
        order.iter().fold(BTreeMap::new(), |acc, &i| {
            merge_contributions(acc, parts[i].clone())
        })
    };
    let expected = fold(&[0, 1, 2, 3]);
    for order in [[3, 2, 1, 0], [1, 3, 0, 2], [2, 0, 3, 1], [0, 2, 1, 3]] {
        assert_eq!(fold(&order), expected);
    }

    // Grouping does not matter either
    let left = merge_contributions(
        merge_contributions(parts[0].clone(), parts[1].clone()),
        parts[2].clone(),
    );
    let right = merge_contributions(
        parts[0].clone(),
        merge_contributions(parts[1].clone(), parts[2].clone()),
    );
    assert_eq!(left, right);
}

#[tokio::test]
async fn risk_tie_goes_to_the_conservative_vote() {
    let model = ScriptedModel::escalating(dec!(0.2), dec!(0.1))
        .with_vote("neutral", RiskVote::Modify)
        .with_vote("conservative", RiskVote::Reject);
    let state = engine(model).orchestrator.run(&test1()).await;

    let decision = state.decision.as_ref().unwrap();
    assert_eq!(decision.risk_verdict, RiskVote::Reject);
    assert_eq!(decision.action, TradeAction::Hold);
    assert_eq!(decision.sizing_hint, Decimal::ZERO);
    assert_eq!(state.risk_votes.len(), 3);
}

#[tokio::test]
async fn risk_majority_modifies_the_plan() {
    let model = ScriptedModel::escalating(dec!(0.2), dec!(0.1))
        .with_vote("aggressive", RiskVote::Modify)
        .with_vote("neutral", RiskVote::Modify);
    let state = engine(model).orchestrator.run(&test1()).await;

    let plan = state.trade_plan.as_ref().unwrap();
    assert_eq!(plan.action, TradeAction::Sell);
    let decision = state.decision.as_ref().unwrap();
    assert_eq!(decision.risk_verdict, RiskVote::Modify);
    assert_eq!(decision.sizing_hint, plan.sizing / Decimal::TWO);
}

#[tokio::test]
async fn failed_risk_agent_abstains() {
    let model = ScriptedModel::static_debate(dec!(0.6), dec!(0.6)).failing_role("conservative");
    let state = engine(model).orchestrator.run(&test1()).await;

    assert_eq!(state.status, RunStatus::Decided);
    let ballot = &state.risk_votes["conservative"];
    assert!(ballot.degraded);
    assert!(state.contributions["conservative"].degraded);
    assert_eq!(
        state.decision.as_ref().unwrap().risk_verdict,
        RiskVote::Approve
    );
}

#[tokio::test]
async fn failed_analyst_is_degraded_not_fatal() {
    let model = ScriptedModel::static_debate(dec!(0.6), dec!(0.6)).failing_role("news");
    let state = engine(model).orchestrator.run(&test1()).await;

    assert_eq!(state.status, RunStatus::Decided);
    let news = &state.contributions["news"];
    assert!(news.degraded);
    assert!(news.confidence <= dec!(0.3));
    assert_eq!(state.degraded_roles(), vec!["news"]);
}

#[tokio::test]
async fn failed_trader_falls_back_to_the_debate_stance() {
    let model = ScriptedModel::escalating(dec!(0.2), dec!(0.1)).failing_role("trader");
    let state = engine(model).orchestrator.run(&test1()).await;

    assert_eq!(state.status, RunStatus::Decided);
    assert!(state.contributions["trader"].degraded);
    let plan = state.trade_plan.as_ref().unwrap();
    assert_eq!(plan.action, TradeAction::Sell);
    assert_eq!(plan.sizing, dec!(0.25));
}

#[tokio::test]
async fn deadline_keeps_completed_phases() {
    let mut config = test_config();
    config.run.deadline_seconds = 1;
    config.agents.role_timeout_seconds = 5;
    let engine = engine_with(
        StaticMarketData::new(),
        ScriptedModel::static_debate(dec!(0.6), dec!(0.6)).with_delay(Duration::from_millis(1500)),
        config,
    );

    let state = engine.orchestrator.run(&test1()).await;
    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(state.failure, Some(FailureReason::DeadlineExceeded));
    assert!(state.incomplete);
    // Init finished before the analysts stalled
    assert!(state.mode.is_some());
    assert!(state.decision.is_none());
    assert!(state.memory_record.is_none());
}

#[tokio::test]
async fn deadline_aborts_in_flight_analysts() {
    let mut config = test_config();
    config.run.deadline_seconds = 1;
    config.agents.role_timeout_seconds = 5;
    let engine = engine_with(
        StaticMarketData::new(),
        ScriptedModel::static_debate(dec!(0.6), dec!(0.6)).with_delay(Duration::from_millis(1500)),
        config,
    );

    let state = engine.orchestrator.run(&test1()).await;
    assert_eq!(state.failure, Some(FailureReason::DeadlineExceeded));
    assert!(engine.model.calls() > 0);
    assert_eq!(engine.model.completions(), 0);

    // The analysts would have finished by now had they kept running
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(engine.model.completions(), 0);
}

#[tokio::test]
async fn cancellation_aborts_in_flight_analysts() {
    let engine = engine(
        ScriptedModel::static_debate(dec!(0.6), dec!(0.6)).with_delay(Duration::from_millis(300)),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let outcome = engine
        .orchestrator
        .execute_cancellable(&test1(), &RecordingObserver::default(), cancel)
        .await;
    assert_eq!(outcome.state.failure, Some(FailureReason::Cancelled));
    assert!(engine.model.calls() > 0);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(engine.model.completions(), 0);
}

#[tokio::test]
async fn cancellation_fails_the_run() {
    let engine = engine_with(
        StaticMarketData::new(),
        ScriptedModel::static_debate(dec!(0.6), dec!(0.6)).with_delay(Duration::from_millis(500)),
        test_config(),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let observer = RecordingObserver::default();
    let outcome = engine
        .orchestrator
        .execute_cancellable(&test1(), &observer, cancel)
        .await;
    assert_eq!(outcome.state.failure, Some(FailureReason::Cancelled));
    assert!(outcome.state.incomplete);
}

#[tokio::test]
async fn decided_run_is_remembered_with_a_backlink() {
    let engine = engine(ScriptedModel::static_debate(dec!(0.6), dec!(0.6)));

    let first = engine.orchestrator.run(&test1()).await;
    let record_id = first.memory_record.expect("memory backlink");
    let record = engine.memory.get(record_id).unwrap().unwrap();
    assert_eq!(record.provenance.run_id, first.run_id);
    assert_eq!(record.provenance.instrument, "TEST1");
    assert!(record.outcome.is_none());

    let second = engine.orchestrator.run(&test1()).await;
    assert_ne!(second.memory_record, Some(record_id));
    assert_eq!(engine.memory.len().unwrap(), 2);

    engine.memory.update_outcome(record_id, "win").unwrap();
    assert!(engine.memory.update_outcome(record_id, "loss").is_err());
}

#[tokio::test]
async fn observer_sees_every_phase_in_order() {
    let engine = engine(ScriptedModel::static_debate(dec!(0.6), dec!(0.6)));
    let observer = RecordingObserver::default();
    let outcome = engine.orchestrator.execute(&test1(), &observer).await;

    assert_eq!(
        observer.phases(),
        vec![
            Phase::Init,
            Phase::AnalystPhase,
            Phase::DebatePhase,
            Phase::RiskPhase,
            Phase::Decision,
            Phase::Terminal,
        ]
    );
    let events = observer.events();
    assert_eq!(
        events.first(),
        Some(&LifecycleEvent::Started {
            run_id: outcome.state.run_id
        })
    );
    assert_eq!(
        events.last(),
        Some(&LifecycleEvent::DecisionReady {
            run_id: outcome.state.run_id
        })
    );
    let completed = events
        .iter()
        .filter(|e| matches!(e, LifecycleEvent::PhaseCompleted { .. }))
        .count();
    assert_eq!(completed, 5);

    let record_id = outcome.pending_memory.unwrap().await.unwrap().unwrap();
    assert!(engine.memory.get(record_id).unwrap().is_some());
}

#[tokio::test]
async fn stressed_user_selects_empathetic_mode() {
    let engine = engine(ScriptedModel::static_debate(dec!(0.6), dec!(0.6)));
    let mut request = test1();
    request.signals.user = radar_models::mode::UserSignal::Stressed;
    let state = engine.orchestrator.run(&request).await;

    let mode = state.mode.as_ref().unwrap();
    assert_eq!(mode.mode, radar_models::mode::Mode::Empathetic);
    // Mode frames prompts only; the run still decides the same way
    assert_eq!(state.status, RunStatus::Decided);
    assert_eq!(state.debate_outcome.as_ref().unwrap().rounds, 1);
}
