use radar_models::agent_message::{ArgumentResponse, PlanResponse, RoleResponse, VoteResponse};
use serde::de::DeserializeOwned;

use crate::error::AgentError;

/// Extract the first JSON object from model output that may carry
/// surrounding prose or a markdown fence.
pub fn extract_json(text: &str) -> Result<String, AgentError> {
    let trimmed = text.trim();

    let candidates = [
        Some(trimmed.to_string()).filter(|t| t.starts_with('{')),
        fenced_block(trimmed),
        first_balanced_object(trimmed),
    ];
    for candidate in candidates.into_iter().flatten() {
        if serde_json::from_str::<serde_json::Value>(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    Err(AgentError::Parse(format!(
        "No valid JSON object found in response (length={})",
        text.len()
    )))
}

/// Contents of the first ```json or bare ``` fence.
fn fenced_block(text: &str) -> Option<String> {
    const OPENERS: [&str; 4] = ["```json\n", "```json\r\n", "```\n", "```\r\n"];

    OPENERS.iter().find_map(|opener| {
        let start = text.find(opener)? + opener.len();
        let len = text[start..].find("```")?;
        Some(text[start..start + len].trim().to_string())
    })
}

/// The first `{ ... }` span with balanced braces outside string literals.
fn first_balanced_object(text: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| text[s..=i].to_string());
                }
            }
            _ => {}
        }
    }

    None
}

fn parse_response<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T, AgentError> {
    let json_str = extract_json(raw)?;
    serde_json::from_str(&json_str)
        .map_err(|e| AgentError::Parse(format!("Failed to parse {what}: {e}\nJSON: {json_str}")))
}

pub fn parse_role_response(raw: &str) -> Result<RoleResponse, AgentError> {
    parse_response(raw, "RoleResponse")
}

pub fn parse_argument(raw: &str) -> Result<ArgumentResponse, AgentError> {
    parse_response(raw, "ArgumentResponse")
}

pub fn parse_plan(raw: &str) -> Result<PlanResponse, AgentError> {
    parse_response(raw, "PlanResponse")
}

pub fn parse_vote(raw: &str) -> Result<VoteResponse, AgentError> {
    parse_response(raw, "VoteResponse")
}

#[cfg(test)]
mod tests {
    use super::*;
    use radar_models::analysis::{RiskVote, TradeAction};
    use rust_decimal_macros::dec;

    #[test]
    fn extract_clean_json() {
        let input = r#"{"confidence": 0.75, "rationale": "test"}"#;
        assert_eq!(extract_json(input).unwrap(), input);
    }

    #[test]
    fn extract_from_markdown() {
        let input = "Here is my view:\n```json\n{\"confidence\": 0.75}\n```\nDone.";
        assert_eq!(extract_json(input).unwrap(), r#"{"confidence": 0.75}"#);
    }

    #[test]
    fn extract_from_markdown_no_lang() {
        let input = "Result:\n```\n{\"confidence\": 0.75}\n```";
        assert_eq!(extract_json(input).unwrap(), r#"{"confidence": 0.75}"#);
    }

    #[test]
    fn extract_with_prefix_text() {
        let input = "After weighing the evidence:\n{\"argument\": \"Margins expanding\", \"confidence\": 0.6}";
        assert!(extract_json(input).unwrap().contains("Margins expanding"));
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let input = r#"Note {draft} {"rationale": "range {low} to {high}", "confidence": 0.5}"#;
        let result = extract_json(input);
        // `{draft}` is not JSON, and scanning stops at the first balanced span
        assert!(result.is_err());

        let input = r#"{"rationale": "range {low} to {high}", "confidence": 0.5}"#;
        let parsed: serde_json::Value = serde_json::from_str(&extract_json(input).unwrap()).unwrap();
        assert_eq!(parsed["confidence"], 0.5);
    }

    #[test]
    fn extract_no_json() {
        assert!(extract_json("Plain prose, nothing structured.").is_err());
        assert!(extract_json("}{").is_err());
    }

    #[test]
    fn parse_all_response_kinds() {
        let role = parse_role_response(
            "```json\n{\"confidence\": \"0.62\", \"rationale\": \"Trend intact\", \"signals\": {\"trend\": \"up\"}}\n```",
        )
        .unwrap();
        assert_eq!(role.confidence, dec!(0.62));
        assert_eq!(role.signals["trend"], "up");

        let argument = parse_argument(r#"{"argument": "Guidance cut", "confidence": 0.7, "concede": false}"#).unwrap();
        assert_eq!(argument.confidence, dec!(0.7));

        let plan = parse_plan(r#"{"action": "sell", "sizing": "0.4", "confidence": "0.6", "rationale": "trim"}"#).unwrap();
        assert_eq!(plan.action, TradeAction::Sell);

        let vote = parse_vote(r#"{"vote": "reject", "confidence": "0.8", "rationale": "too volatile"}"#).unwrap();
        assert_eq!(vote.vote, RiskVote::Reject);
    }

    #[test]
    fn missing_field_is_a_parse_error() {
        let err = parse_vote(r#"{"confidence": "0.8"}"#).unwrap_err();
        assert!(matches!(err, AgentError::Parse(msg) if msg.contains("VoteResponse")));
    }
}
