use std::time::Duration;

use async_trait::async_trait;
use radar_models::analysis::{RoleKind, Side};
use radar_models::mode::Mode;

use crate::error::AgentError;

/// What a prompt asks the model to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Analyze(RoleKind),
    Argue(Side),
    Plan,
    Vote,
}

/// A fully rendered prompt plus the metadata a model adapter may route on.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub role: String,
    pub task: Task,
    pub mode: Mode,
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub token_usage: Option<u64>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            token_usage: None,
        }
    }
}

/// A language-model backend. Mockable for testing.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(
        &self,
        prompt: &PromptContext,
        timeout: Duration,
    ) -> Result<Completion, AgentError>;
}
