//! The run service end to end: submission, status, streaming events,
//! results, outcome feedback and shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use radar::service::AnalysisService;
use radar::{build_context, build_orchestrator_with, EngineContext};
use radar_agents::test_support::{test_config, test_gateway, ScriptedModel, StaticMarketData};
use radar_agents::RoleRoster;
use radar_memory::{HashingEmbedder, MemoryStore};
use radar_models::analysis::{FailureReason, Phase, RunStatus};
use radar_models::config::EngineConfig;
use radar_models::events::LifecycleEvent;
use radar_models::request::{AnalysisRequest, InvalidInput};
use rust_decimal_macros::dec;

fn test_context(config: &EngineConfig) -> EngineContext {
    let (gateway, _sources) = test_gateway(StaticMarketData::new());
    EngineContext {
        gateway,
        memory: Arc::new(MemoryStore::in_memory(config.memory.dimension)),
        embedder: Arc::new(HashingEmbedder::new(config.memory.dimension)),
    }
}

fn service_with(model: ScriptedModel, config: EngineConfig) -> (AnalysisService, EngineContext) {
    let context = test_context(&config);
    let roster = RoleRoster::with_model(&config, Arc::clone(&context.gateway), Arc::new(model));
    let service = AnalysisService::new(build_orchestrator_with(&config, &context, roster));
    (service, context)
}

fn test1() -> AnalysisRequest {
    AnalysisRequest::new("TEST1", NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
}

#[tokio::test]
async fn submitted_run_decides_and_streams_events() {
    let (service, _context) =
        service_with(ScriptedModel::static_debate(dec!(0.6), dec!(0.6)), test_config());
    let mut events = service.subscribe();

    let run_id = service.submit_analysis(test1()).unwrap();
    assert!(service.get_status(run_id).is_some());

    let state = service.wait_for_result(run_id).await.unwrap();
    assert_eq!(state.status, RunStatus::Decided);
    assert!(state.memory_record.is_some());

    let view = service.get_status(run_id).unwrap();
    assert_eq!(view.status, RunStatus::Decided);
    assert_eq!(view.current_phase, Phase::Terminal);

    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("terminal event")
            .unwrap();
        let done = matches!(event, LifecycleEvent::DecisionReady { .. });
        seen.push(event);
        if done {
            break;
        }
    }
    assert_eq!(seen.first(), Some(&LifecycleEvent::Started { run_id }));
    assert_eq!(seen.last(), Some(&LifecycleEvent::DecisionReady { run_id }));
    assert!(seen.iter().all(|e| e.run_id() == run_id));
}

#[tokio::test]
async fn invalid_requests_are_rejected_synchronously() {
    let (service, _context) =
        service_with(ScriptedModel::static_debate(dec!(0.6), dec!(0.6)), test_config());

    let mut empty = test1();
    empty.instrument = String::new();
    assert_eq!(
        service.submit_analysis(empty).unwrap_err(),
        InvalidInput::EmptyInstrument
    );

    let mut future = test1();
    future.as_of = NaiveDate::from_ymd_opt(2999, 1, 1).unwrap();
    assert!(matches!(
        service.submit_analysis(future),
        Err(InvalidInput::FutureDate { .. })
    ));
}

#[tokio::test]
async fn result_is_hidden_until_terminal() {
    let (service, _context) = service_with(
        ScriptedModel::static_debate(dec!(0.6), dec!(0.6)).with_delay(Duration::from_millis(300)),
        test_config(),
    );
    let run_id = service.submit_analysis(test1()).unwrap();

    assert!(service.get_result(run_id).is_none());
    assert!(!service.get_status(run_id).unwrap().status.is_terminal());

    let state = service.wait_for_result(run_id).await.unwrap();
    assert!(state.status.is_terminal());
    assert!(service.get_result(run_id).is_some());
}

#[tokio::test]
async fn unknown_run_has_no_status() {
    let (service, _context) =
        service_with(ScriptedModel::static_debate(dec!(0.6), dec!(0.6)), test_config());
    let run_id = uuid::Uuid::new_v4();
    assert!(service.get_status(run_id).is_none());
    assert!(service.wait_for_result(run_id).await.is_none());
}

#[tokio::test]
async fn shutdown_cancels_in_flight_runs() {
    let (service, _context) = service_with(
        ScriptedModel::static_debate(dec!(0.6), dec!(0.6)).with_delay(Duration::from_secs(1)),
        test_config(),
    );
    let run_id = service.submit_analysis(test1()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    service.shutdown().await;
    let state = service.get_result(run_id).unwrap();
    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(state.failure, Some(FailureReason::Cancelled));
    assert!(state.incomplete);
}

#[tokio::test]
async fn outcome_feedback_labels_the_record_once() {
    let (service, context) =
        service_with(ScriptedModel::static_debate(dec!(0.6), dec!(0.6)), test_config());
    let run_id = service.submit_analysis(test1()).unwrap();
    let record_id = service
        .wait_for_result(run_id)
        .await
        .and_then(|state| state.memory_record)
        .unwrap();

    service.record_outcome(record_id, "win").unwrap();
    assert_eq!(
        context.memory.get(record_id).unwrap().unwrap().outcome.as_deref(),
        Some("win")
    );
    assert!(service.record_outcome(record_id, "loss").is_err());
    assert!(service.record_outcome(uuid::Uuid::new_v4(), "win").is_err());
}

#[tokio::test]
async fn resubmitting_a_request_starts_a_separate_run() {
    let (service, _context) =
        service_with(ScriptedModel::static_debate(dec!(0.6), dec!(0.6)), test_config());
    let request = test1();

    let first = service.submit_analysis(request.clone()).unwrap();
    let first_state = service.wait_for_result(first).await.unwrap();

    let second = service.submit_analysis(request.clone()).unwrap();
    assert_ne!(first, second);
    assert_ne!(first, request.id);

    // The finished run is untouched by the resubmission
    assert_eq!(service.get_status(first).unwrap().status, RunStatus::Decided);
    assert_eq!(service.get_result(first).unwrap().run_id, first);

    let second_state = service.wait_for_result(second).await.unwrap();
    assert_eq!(second_state.run_id, second);
    assert_ne!(first_state.memory_record, second_state.memory_record);
}

#[tokio::test]
async fn oldest_finished_runs_are_evicted() {
    let mut config = test_config();
    config.run.retained_runs = 2;
    let (service, _context) =
        service_with(ScriptedModel::static_debate(dec!(0.6), dec!(0.6)), config);

    let mut ids = Vec::new();
    for _ in 0..3 {
        let run_id = service.submit_analysis(test1()).unwrap();
        service.wait_for_result(run_id).await.unwrap();
        ids.push(run_id);
    }

    assert!(service.get_status(ids[0]).is_none());
    assert!(service.get_result(ids[1]).is_some());
    assert!(service.get_result(ids[2]).is_some());
}

#[tokio::test]
async fn forget_drops_only_finished_runs() {
    let (service, _context) = service_with(
        ScriptedModel::static_debate(dec!(0.6), dec!(0.6)).with_delay(Duration::from_millis(200)),
        test_config(),
    );
    let run_id = service.submit_analysis(test1()).unwrap();

    assert!(service.forget(run_id).is_none());
    assert!(service.get_status(run_id).is_some());

    service.wait_for_result(run_id).await.unwrap();
    let state = service.forget(run_id).unwrap();
    assert_eq!(state.run_id, run_id);
    assert!(service.get_status(run_id).is_none());
    assert!(service.forget(run_id).is_none());
}

#[tokio::test]
async fn file_backed_context_serves_a_run() {
    let dir = tempfile::tempdir().unwrap();
    let as_of = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let symbol_dir = dir.path().join("TEST1");
    std::fs::create_dir_all(&symbol_dir).unwrap();
    let snapshot = radar_agents::test_support::sample_snapshot("TEST1", as_of);
    std::fs::write(
        symbol_dir.join("2024-01-02.json"),
        serde_json::to_string(&snapshot).unwrap(),
    )
    .unwrap();
    std::fs::write(
        symbol_dir.join("news.json"),
        r#"{"headlines": ["TEST1 beats estimates"]}"#,
    )
    .unwrap();

    let mut config = test_config();
    config.market_data.data_dir = dir.path().display().to_string();
    config.memory.sqlite_path = Some(dir.path().join("memory.db").display().to_string());
    let context = build_context(&config).unwrap();
    let roster = RoleRoster::with_model(
        &config,
        Arc::clone(&context.gateway),
        Arc::new(ScriptedModel::static_debate(dec!(0.6), dec!(0.6))),
    );
    let service = AnalysisService::new(build_orchestrator_with(&config, &context, roster));

    let run_id = service.submit_analysis(test1()).unwrap();
    let state = service.wait_for_result(run_id).await.unwrap();
    assert_eq!(state.status, RunStatus::Decided);
    assert!(!state.contributions["news"].degraded);
    // No fundamentals or sentiment files on disk
    assert!(state.contributions["fundamentals"].degraded);
    assert!(state.contributions["sentiment"].degraded);

    // The record survives a reopen of the store
    let record_id = state.memory_record.unwrap();
    drop(service);
    drop(context);
    let reopened = MemoryStore::open(
        config.memory.sqlite_path.as_deref().unwrap(),
        config.memory.dimension,
    )
    .unwrap();
    assert!(reopened.get(record_id).unwrap().is_some());
}
