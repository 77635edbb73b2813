use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::llm::{Completion, LanguageModel, PromptContext};

/// Invoke the `claude` CLI with a system prompt and user prompt.
/// Returns the raw stdout text.
pub async fn invoke_claude(
    system_prompt: &str,
    user_prompt: &str,
    model: &str,
    timeout: Duration,
) -> Result<String, AgentError> {
    debug!(model, "Invoking claude CLI");

    let result = tokio::time::timeout(timeout, async {
        Command::new("claude")
            .args([
                "-p",
                user_prompt,
                "--system-prompt",
                system_prompt,
                "--model",
                model,
                "--output-format",
                "text",
            ])
            .kill_on_drop(true)
            .output()
            .await
    })
    .await
    .map_err(|_| AgentError::Timeout(timeout.as_secs()))?
    .map_err(|e| AgentError::Cli(format!("Failed to spawn claude: {e}")))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        warn!(status = %result.status, stderr = %stderr, "Claude CLI failed");
        return Err(AgentError::Cli(format!(
            "claude exited {}: {}",
            result.status, stderr
        )));
    }

    let stdout = String::from_utf8_lossy(&result.stdout).to_string();
    if stdout.trim().is_empty() {
        return Err(AgentError::Cli(
            "Claude returned empty response".to_string(),
        ));
    }

    Ok(stdout)
}

/// Check if the `claude` CLI is available on the system.
pub async fn check_cli_available() -> bool {
    match Command::new("claude").arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// [`LanguageModel`] backed by the `claude` CLI. One process per completion.
#[derive(Debug, Clone)]
pub struct ClaudeCliModel {
    model: String,
}

impl ClaudeCliModel {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for ClaudeCliModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        prompt: &PromptContext,
        timeout: Duration,
    ) -> Result<Completion, AgentError> {
        debug!(role = %prompt.role, mode = ?prompt.mode, "Claude completion");
        let text = invoke_claude(&prompt.system, &prompt.user, &self.model, timeout).await?;
        Ok(Completion::text(text))
    }
}
