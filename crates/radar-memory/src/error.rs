use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Embedding has dimension {actual}, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),

    #[error("Memory record not found: {0}")]
    NotFound(Uuid),

    #[error("Outcome already recorded for {0}")]
    OutcomeAlreadyRecorded(Uuid),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Memory store not available: {0}")]
    Unavailable(String),
}
