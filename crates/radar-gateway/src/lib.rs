pub mod cache;
pub mod error;
pub mod gateway;
pub mod market;
pub mod memory;
pub mod source;
pub mod sqlite;

pub use cache::ToolCache;
pub use error::GatewayError;
pub use gateway::{ToolGateway, LIVE_ATTEMPTS};
pub use market::{FileMarketData, FileResourceSource, MarketData, SnapshotSource};
pub use source::{ResourceSource, SourceRegistry};
pub use sqlite::SqliteStore;
