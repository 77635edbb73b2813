use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Claude CLI error: {0}")]
    Cli(String),

    #[error("Agent response parse error: {0}")]
    Parse(String),

    #[error("Agent timed out after {0} seconds")]
    Timeout(u64),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Gateway error: {0}")]
    Gateway(#[from] radar_gateway::GatewayError),

    #[error("Memory error: {0}")]
    Memory(#[from] radar_memory::MemoryError),

    #[error("Debate failed: {0}")]
    DebateFailure(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
