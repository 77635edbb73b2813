use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Data unavailable for {key}: {reason}")]
    DataUnavailable { key: String, reason: String },

    #[error("Live fetch of {key} timed out after {timeout_ms} ms")]
    Timeout { key: String, timeout_ms: u64 },

    #[error("Source error for {key}: {message}")]
    Source { key: String, message: String },

    #[error("No source registered for resource key: {0}")]
    UnknownResource(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Cache not available: {0}")]
    Unavailable(String),
}

impl GatewayError {
    pub fn data_unavailable(key: impl Into<String>, reason: impl Into<String>) -> Self {
        GatewayError::DataUnavailable {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn source(key: impl Into<String>, message: impl Into<String>) -> Self {
        GatewayError::Source {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Whether a retry of the live call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout { .. } | GatewayError::Source { .. }
        )
    }
}
