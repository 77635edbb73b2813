pub mod embedding;
pub mod error;
pub mod sqlite;
pub mod store;

pub use embedding::{cosine_similarity, Embedder, HashingEmbedder};
pub use error::MemoryError;
pub use store::{MemoryMatches, MemoryStore, PrunePolicy};
