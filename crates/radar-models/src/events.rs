use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{FailureReason, Phase};

/// Lifecycle events emitted for streaming consumers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Started { run_id: Uuid },
    PhaseCompleted { run_id: Uuid, phase: Phase },
    DecisionReady { run_id: Uuid },
    Failed { run_id: Uuid, reason: FailureReason },
}

impl LifecycleEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            LifecycleEvent::Started { run_id }
            | LifecycleEvent::PhaseCompleted { run_id, .. }
            | LifecycleEvent::DecisionReady { run_id }
            | LifecycleEvent::Failed { run_id, .. } => *run_id,
        }
    }
}
