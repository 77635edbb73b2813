use radar_models::mode::{MarketSignal, Mode, ModeDecision, SystemHealth, UserSignal};
use rust_decimal::Decimal;

/// Picks the interaction tone for a run.
///
/// Rules, first match wins:
/// 1. critical system health → Engineer
/// 2. market crash or stressed user → Empathetic
/// 3. otherwise → Analyst
pub struct ModeController;

impl ModeController {
    pub fn decide(user: UserSignal, market: MarketSignal, health: SystemHealth) -> ModeDecision {
        if health == SystemHealth::Critical {
            return ModeDecision {
                mode: Mode::Engineer,
                confidence: Decimal::ONE,
                signals: vec!["system_health:critical".to_string()],
            };
        }

        let mut triggers = Vec::new();
        if market == MarketSignal::Crash {
            triggers.push("market:crash".to_string());
        }
        if user == UserSignal::Stressed {
            triggers.push("user:stressed".to_string());
        }
        if !triggers.is_empty() {
            let confidence = if market == MarketSignal::Crash {
                Decimal::new(9, 1)
            } else {
                Decimal::new(8, 1)
            };
            return ModeDecision {
                mode: Mode::Empathetic,
                confidence,
                signals: triggers,
            };
        }

        ModeDecision {
            mode: Mode::Analyst,
            confidence: Decimal::new(6, 1),
            signals: Vec::new(),
        }
    }
}
