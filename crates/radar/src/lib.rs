//! RADAR - Role-Agent Debate And Risk engine
//!
//! Produces a trading recommendation for an instrument and an as-of date by
//! running analyst roles in parallel, a bounded Bull/Bear debate, a trader
//! and a risk panel, with memory of past analyses and cached tool access.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use radar::models::{AnalysisRequest, EngineConfig};
//! use radar::service::AnalysisService;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = EngineConfig::default();
//! let context = radar::build_context(&config)?;
//! let service = AnalysisService::new(radar::build_orchestrator(&config, &context));
//!
//! let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
//! let run_id = service.submit_analysis(AnalysisRequest::new("AAPL", date))?;
//! let state = service.wait_for_result(run_id).await;
//! # Ok(())
//! # }
//! ```

pub use radar_agents as agents;
pub use radar_gateway as gateway;
pub use radar_memory as memory;
pub use radar_models as models;

pub mod service;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use radar_agents::{ClaudeCliModel, LanguageModel, Orchestrator, RoleRoster};
use radar_gateway::{FileMarketData, FileResourceSource, SnapshotSource, SourceRegistry, ToolGateway};
use radar_memory::{Embedder, HashingEmbedder, MemoryStore, PrunePolicy};
use radar_models::config::EngineConfig;
use radar_models::tool::resource_keys;
use tracing::info;

/// Shared collaborators, built once per process and handed out by `Arc`.
#[derive(Clone)]
pub struct EngineContext {
    pub gateway: Arc<ToolGateway>,
    pub memory: Arc<MemoryStore>,
    pub embedder: Arc<dyn Embedder>,
}

/// Read an [`EngineConfig`] from a TOML file. Missing keys take defaults.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<EngineConfig> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("Failed to parse config: {}", path.display()))
}

/// Wire the gateway sources, cache tiers and memory store from configuration.
///
/// Snapshots come from `{data_dir}/{SYMBOL}/{YYYY-MM-DD}.json`; fundamentals,
/// news and sentiment from `{data_dir}/{SYMBOL}/{resource}.json`.
pub fn build_context(config: &EngineConfig) -> anyhow::Result<EngineContext> {
    let data_dir = &config.market_data.data_dir;
    let registry = SourceRegistry::new()
        .with(
            resource_keys::SNAPSHOT,
            Arc::new(SnapshotSource::new(FileMarketData::new(data_dir))),
        )?
        .with(
            resource_keys::FUNDAMENTALS,
            Arc::new(FileResourceSource::new(data_dir, resource_keys::FUNDAMENTALS)),
        )?
        .with(
            resource_keys::NEWS,
            Arc::new(FileResourceSource::new(data_dir, resource_keys::NEWS)),
        )?
        .with(
            resource_keys::SENTIMENT,
            Arc::new(FileResourceSource::new(data_dir, resource_keys::SENTIMENT)),
        )?;

    let gateway = ToolGateway::from_config(&config.gateway, registry)
        .context("Failed to build tool gateway")?;

    let dimension = config.memory.dimension;
    let memory = match &config.memory.sqlite_path {
        Some(path) => {
            if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            MemoryStore::open(path, dimension)
                .with_context(|| format!("Failed to open memory store: {path}"))?
        }
        None => MemoryStore::in_memory(dimension),
    };

    info!(
        data_dir = %data_dir,
        sources = 4,
        memory_persistent = config.memory.sqlite_path.is_some(),
        "Engine context ready"
    );

    Ok(EngineContext {
        gateway: Arc::new(gateway),
        memory: Arc::new(memory),
        embedder: Arc::new(HashingEmbedder::new(dimension)),
    })
}

/// Build an orchestrator whose roles run on the Claude CLI.
pub fn build_orchestrator(config: &EngineConfig, context: &EngineContext) -> Orchestrator {
    let roster = RoleRoster::from_config(config, Arc::clone(&context.gateway), |model| {
        Arc::new(ClaudeCliModel::new(model)) as Arc<dyn LanguageModel>
    });
    build_orchestrator_with(config, context, roster)
}

/// Build an orchestrator around an explicit roster.
pub fn build_orchestrator_with(
    config: &EngineConfig,
    context: &EngineContext,
    roster: RoleRoster,
) -> Orchestrator {
    Orchestrator::new(
        Arc::clone(&context.gateway),
        Arc::clone(&context.memory),
        Arc::clone(&context.embedder),
        roster,
        config.clone(),
    )
}

/// Counts removed by [`prune`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneReport {
    pub memory_records: usize,
    pub cached_entries: usize,
}

/// Drop memory records and warm-cache entries older than `max_age`.
pub fn prune(context: &EngineContext, max_age: chrono::Duration) -> anyhow::Result<PruneReport> {
    let memory_records = context
        .memory
        .prune(PrunePolicy::MaxAge(max_age))
        .context("Failed to prune memory store")?;
    let cached_entries = context
        .gateway
        .cache()
        .prune_warm(Utc::now() - max_age)
        .context("Failed to prune tool cache")?;
    Ok(PruneReport {
        memory_records,
        cached_entries,
    })
}
