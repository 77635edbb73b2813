use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which run produced a memory record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provenance {
    pub run_id: Uuid,
    pub instrument: String,
    pub as_of: NaiveDate,
}

/// An embedding-indexed record of a past analysis.
///
/// Append-only. `outcome` starts empty and may be filled exactly once, when
/// the realised result of the recommendation becomes known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub embedding: Vec<f32>,
    pub source_text: String,
    pub outcome: Option<String>,
    pub created_at: DateTime<Utc>,
    pub provenance: Provenance,
}

impl MemoryRecord {
    pub fn new(embedding: Vec<f32>, source_text: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            id: Uuid::new_v4(),
            embedding,
            source_text: source_text.into(),
            outcome: None,
            created_at: Utc::now(),
            provenance,
        }
    }
}

/// A record returned from a similarity query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryMatch {
    pub record: MemoryRecord,
    /// Cosine similarity in `[-1, 1]`.
    pub similarity: f32,
}
