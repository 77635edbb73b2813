//! Tests that talk to the real Claude CLI.
//!
//! Ignored by default. They need the `claude` CLI on PATH with working
//! credentials. Run explicitly with:
//! ```bash
//! cargo test -p radar-agents --test cli_integration -- --ignored
//! ```

use std::time::Duration;

use chrono::NaiveDate;
use radar_agents::claude_cli::{check_cli_available, invoke_claude};
use radar_agents::parser::{extract_json, parse_role_response};
use radar_agents::test_support::sample_snapshot;
use radar_agents::{ClaudeCliModel, LlmAnalyst, RoleAgent};
use radar_models::agent_message::RoleRequest;
use radar_models::analysis::RoleKind;
use radar_models::mode::Mode;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

const MODEL: &str = "claude-3-5-haiku-latest";

#[tokio::test]
#[ignore]
async fn cli_is_available() {
    assert!(
        check_cli_available().await,
        "claude CLI not found on PATH"
    );
}

/// Catches CLI output-format changes that would break JSON extraction.
#[tokio::test]
#[ignore]
async fn cli_output_is_parseable_json() {
    if !check_cli_available().await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let system_prompt = concat!(
        "You are a test agent. Respond ONLY with a JSON object, no other text.\n",
        "The JSON must have exactly these fields:\n",
        "- \"confidence\": the string \"0.5\"\n",
        "- \"rationale\": repeat back the user's message exactly\n",
    );

    let raw = invoke_claude(system_prompt, "ping", MODEL, Duration::from_secs(30))
        .await
        .expect("Claude CLI invocation failed");

    let json = extract_json(&raw)
        .unwrap_or_else(|e| panic!("no JSON in CLI output ({e}):\n---\n{raw}\n---"));
    assert!(json.contains("confidence"));

    let response = parse_role_response(&raw).expect("role response shape");
    assert_eq!(response.confidence, Decimal::new(5, 1));
}

#[tokio::test]
#[ignore]
async fn cli_reports_errors_for_invalid_model() {
    if !check_cli_available().await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let result = invoke_claude(
        "You are a test.",
        "hello",
        "nonexistent-model-12345",
        Duration::from_secs(15),
    )
    .await;
    assert!(result.is_err(), "expected an error, got {result:?}");
}

#[tokio::test]
#[ignore]
async fn market_analyst_end_to_end() {
    if !check_cli_available().await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let as_of = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let analyst = LlmAnalyst::new(
        "market",
        RoleKind::Market,
        Arc::new(ClaudeCliModel::new(MODEL)),
        Duration::from_secs(60),
    );
    let request = RoleRequest {
        request_id: Uuid::new_v4(),
        run_id: Uuid::new_v4(),
        role: "market".to_string(),
        kind: RoleKind::Market,
        instrument: "TEST1".to_string(),
        as_of,
        snapshot: sample_snapshot("TEST1", as_of),
        memories: vec![],
        extra_context: vec![],
        mode: Mode::Analyst,
    };

    let contribution = analyst.analyze(&request).await.expect("analysis");
    assert!(contribution.confidence >= Decimal::ZERO);
    assert!(contribution.confidence <= Decimal::ONE);
    assert!(!contribution.rationale.is_empty());
}
