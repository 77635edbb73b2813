use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use radar_models::agent_message::{MemoryDigest, OpposingTurn};
use radar_models::analysis::{
    clamp_unit, DebateOutcome, DebateTurn, RoleContribution, Side, Stance, Termination,
};
use radar_models::config::DebateConfig;
use radar_models::memory::MemoryMatch;
use radar_models::mode::Mode;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AgentError;
use crate::roles::{DebateRequest, Debater};

/// Inputs the debate needs from the run.
#[derive(Debug, Clone)]
pub struct DebateInput {
    pub run_id: Uuid,
    pub instrument: String,
    pub as_of: NaiveDate,
    pub contributions: BTreeMap<String, RoleContribution>,
    pub mode: Mode,
    /// Round cap for this run.
    pub max_rounds: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebateResult {
    pub outcome: DebateOutcome,
    pub history: Vec<DebateTurn>,
}

/// Runs the bounded Bull/Bear exchange and judges it.
///
/// Each round is a Bull turn then a Bear turn. The loop ends on the first of:
/// a round where every turn moved confidence by less than
/// `convergence_delta`; one side's argument standing unrebutted for
/// `unrebutted_turns` consecutive opposing turns; or the round cap.
pub struct DebateCoordinator {
    bull: Arc<dyn Debater>,
    bear: Arc<dyn Debater>,
    config: DebateConfig,
}

/// Tracks the argument currently standing without rebuttal.
#[derive(Debug, Default)]
struct Unrebutted {
    side: Option<Side>,
    count: u32,
}

impl DebateCoordinator {
    pub fn new(bull: Arc<dyn Debater>, bear: Arc<dyn Debater>, config: DebateConfig) -> Self {
        Self { bull, bear, config }
    }

    pub fn config(&self) -> &DebateConfig {
        &self.config
    }

    pub async fn run(
        &self,
        input: &DebateInput,
        memories: &[MemoryMatch],
    ) -> Result<DebateResult, AgentError> {
        let max_rounds = input.max_rounds.max(1);
        let digests: Vec<MemoryDigest> = memories.iter().map(MemoryDigest::from).collect();
        let known_memories: HashSet<Uuid> = memories.iter().map(|m| m.record.id).collect();
        let contributions: Vec<RoleContribution> = input.contributions.values().cloned().collect();
        let turn_timeout = Duration::from_secs(self.config.turn_timeout_seconds);

        let mut history: Vec<DebateTurn> = Vec::new();
        let mut last_confidence: Option<Decimal> = None;
        let mut own_confidence: BTreeMap<Side, Decimal> = BTreeMap::new();
        let mut unrebutted = Unrebutted::default();
        let mut termination = None;
        let mut rounds = 0;

        'rounds: for round in 1..=max_rounds {
            rounds = round;
            let mut quiet_round = true;

            for side in [Side::Bull, Side::Bear] {
                let debater = match side {
                    Side::Bull => &self.bull,
                    Side::Bear => &self.bear,
                };
                let opponent = latest_turn(&history, side.opponent()).map(|t| OpposingTurn {
                    side: t.side,
                    round: t.round,
                    argument: t.argument.clone(),
                    confidence: t.confidence,
                });
                let request = DebateRequest {
                    run_id: input.run_id,
                    instrument: input.instrument.clone(),
                    as_of: input.as_of,
                    side,
                    round,
                    contributions: contributions.clone(),
                    opponent,
                    memories: digests.clone(),
                    mode: input.mode,
                };

                let response = match tokio::time::timeout(turn_timeout, debater.argue(&request)).await
                {
                    Ok(Ok(response)) if !response.concede => Some(response),
                    Ok(Ok(_)) => {
                        info!(run_id = %input.run_id, %side, round, "Debater conceded");
                        None
                    }
                    Ok(Err(e)) => {
                        warn!(run_id = %input.run_id, %side, round, error = %e, "Debate turn failed");
                        None
                    }
                    Err(_) => {
                        warn!(run_id = %input.run_id, %side, round, "Debate turn timed out");
                        None
                    }
                };

                let Some(response) = response else {
                    quiet_round = false;
                    let standing = side.opponent();
                    if latest_turn(&history, standing).is_some() {
                        if unrebutted.side == Some(standing) {
                            unrebutted.count += 1;
                        } else {
                            unrebutted = Unrebutted {
                                side: Some(standing),
                                count: 1,
                            };
                        }
                        if unrebutted.count >= self.config.unrebutted_turns {
                            termination = Some(Termination::Unrebutted(standing));
                            break 'rounds;
                        }
                    }
                    continue;
                };

                let confidence = clamp_unit(response.confidence);
                // Measured against the side's own previous turn, or the last
                // confidence in the debate for its opening turn
                let delta = own_confidence
                    .get(&side)
                    .copied()
                    .or(last_confidence)
                    .map(|prev| (confidence - prev).abs())
                    .unwrap_or(Decimal::ZERO);
                if delta >= self.config.convergence_delta {
                    quiet_round = false;
                }
                last_confidence = Some(confidence);
                own_confidence.insert(side, confidence);
                if unrebutted.side == Some(side.opponent()) {
                    unrebutted = Unrebutted::default();
                }

                let turn = DebateTurn {
                    round,
                    seq: history.len() as u32 + 1,
                    side,
                    argument: response.argument,
                    confidence,
                    cited_roles: response
                        .cited_roles
                        .into_iter()
                        .filter(|role| input.contributions.contains_key(role))
                        .collect(),
                    cited_memories: response
                        .cited_memories
                        .into_iter()
                        .filter(|id| known_memories.contains(id))
                        .collect(),
                };
                debug!(run_id = %input.run_id, %side, round, %confidence, %delta, "Debate turn");
                history.push(turn);
            }

            if quiet_round {
                termination = Some(Termination::Converged);
                break;
            }
        }

        let termination = termination.unwrap_or(Termination::RoundCap);
        let non_convergent = termination == Termination::RoundCap;
        let verdict = self.judge(&history)?;

        let confidence = if non_convergent {
            verdict.confidence * (Decimal::ONE - self.config.non_convergence_penalty)
        } else {
            verdict.confidence
        };
        let confidence = clamp_unit(confidence).round_dp(4);

        info!(
            run_id = %input.run_id,
            rounds,
            turns = history.len(),
            stance = ?verdict.stance,
            %confidence,
            non_convergent,
            "Debate complete"
        );

        Ok(DebateResult {
            outcome: DebateOutcome {
                stance: verdict.stance,
                synthesis: verdict.synthesis,
                confidence,
                rounds,
                non_convergent,
                termination,
            },
            history,
        })
    }

    /// Deterministic verdict over the finished history.
    fn judge(&self, history: &[DebateTurn]) -> Result<Verdict, AgentError> {
        let bull = self.side_score(history, Side::Bull);
        let bear = self.side_score(history, Side::Bear);

        let (stance, confidence) = match (bull, bear) {
            (None, None) => {
                return Err(AgentError::DebateFailure(
                    "neither side produced an argument".to_string(),
                ))
            }
            (Some(bull), None) => (Stance::Bullish, bull.weighted),
            (None, Some(bear)) => (Stance::Bearish, bear.weighted),
            (Some(bull), Some(bear)) => {
                let margin = (bull.score - bear.score).abs();
                if margin < self.config.tie_margin {
                    (Stance::Neutral, (bull.weighted + bear.weighted) / Decimal::TWO)
                } else if bull.score > bear.score {
                    (Stance::Bullish, bull.weighted)
                } else {
                    (Stance::Bearish, bear.weighted)
                }
            }
        };

        let synthesis = match stance {
            Stance::Neutral => {
                let bull_arg = latest_turn(history, Side::Bull).map(|t| t.argument.as_str());
                let bear_arg = latest_turn(history, Side::Bear).map(|t| t.argument.as_str());
                format!(
                    "Balanced debate. Bull: {} Bear: {}",
                    bull_arg.unwrap_or("-"),
                    bear_arg.unwrap_or("-")
                )
            }
            Stance::Bullish => latest_turn(history, Side::Bull)
                .map(|t| t.argument.clone())
                .unwrap_or_default(),
            Stance::Bearish => latest_turn(history, Side::Bear)
                .map(|t| t.argument.clone())
                .unwrap_or_default(),
        };

        Ok(Verdict {
            stance,
            confidence,
            synthesis,
        })
    }

    fn side_score(&self, history: &[DebateTurn], side: Side) -> Option<SideScore> {
        let turns: Vec<&DebateTurn> = history.iter().filter(|t| t.side == side).collect();
        let last = turns.last()?;

        // Latest turn weighs 1, each older turn `recency_decay` times less
        let mut weight = Decimal::ONE;
        let mut weighted_sum = Decimal::ZERO;
        let mut weight_total = Decimal::ZERO;
        for turn in turns.iter().rev() {
            weighted_sum += weight * turn.confidence;
            weight_total += weight;
            weight *= self.config.recency_decay;
        }
        let weighted = if weight_total.is_zero() {
            last.confidence
        } else {
            weighted_sum / weight_total
        };

        let evidence = if self.config.evidence_cap == 0 {
            Decimal::ZERO
        } else {
            let cap = Decimal::from(self.config.evidence_cap);
            let cited = Decimal::from(last.citation_count() as u64).min(cap);
            self.config.evidence_weight * cited / cap
        };

        Some(SideScore {
            weighted,
            score: weighted + evidence,
        })
    }
}

struct SideScore {
    /// Recency-weighted confidence.
    weighted: Decimal,
    /// `weighted` plus the evidence bonus.
    score: Decimal,
}

struct Verdict {
    stance: Stance,
    confidence: Decimal,
    synthesis: String,
}

fn latest_turn(history: &[DebateTurn], side: Side) -> Option<&DebateTurn> {
    history.iter().rev().find(|t| t.side == side)
}
