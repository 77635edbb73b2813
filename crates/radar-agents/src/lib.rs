pub mod claude_cli;
pub mod debate;
pub mod error;
pub mod llm;
pub mod mode;
pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod roles;

pub mod test_support;

pub use claude_cli::ClaudeCliModel;
pub use debate::{DebateCoordinator, DebateInput, DebateResult};
pub use error::AgentError;
pub use llm::{Completion, LanguageModel, PromptContext, Task};
pub use mode::ModeController;
pub use orchestrator::{
    assemble_decision, fallback_plan, tally_votes, NoopObserver, Orchestrator, RoleRoster,
    RunObserver, RunOutcome,
};
pub use roles::{
    Debater, LlmAnalyst, LlmDebater, LlmRiskAgent, LlmTrader, RiskAgent, RoleAgent, TraderAgent,
};
