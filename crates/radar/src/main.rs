use std::io::Read;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use radar::service::AnalysisService;
use radar_models::request::AnalysisRequest;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "radar", about = "Role-Agent Debate And Risk engine")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config/radar.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one analysis and print the final state as JSON
    Analyze {
        /// Read AnalysisRequest JSON from a file instead of stdin
        #[arg(short, long)]
        input: Option<String>,

        /// Pretty-print the output JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Record the realised outcome of a remembered analysis
    Outcome {
        /// Memory record id (the `memory_record` of a decided run)
        #[arg(long)]
        record: Uuid,

        #[arg(long)]
        label: String,
    },
    /// Drop memory records and cached tool data older than the given age
    Prune {
        #[arg(long, default_value_t = 90)]
        max_age_days: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing (respects RUST_LOG env var)
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config = radar::load_config(&cli.config)?;
    let context = radar::build_context(&config).context("Failed to build engine context")?;

    match cli.command {
        Command::Analyze { input, pretty } => {
            let request_json = if let Some(input_path) = &input {
                std::fs::read_to_string(input_path)
                    .with_context(|| format!("Failed to read input: {input_path}"))?
            } else {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read from stdin")?;
                buf
            };
            let request: AnalysisRequest = serde_json::from_str(&request_json)
                .context("Failed to parse AnalysisRequest JSON")?;

            let service = AnalysisService::new(radar::build_orchestrator(&config, &context));
            let run_id = service
                .submit_analysis(request)
                .context("Request rejected")?;

            let state = tokio::select! {
                state = service.wait_for_result(run_id) => state,
                _ = tokio::signal::ctrl_c() => {
                    service.shutdown().await;
                    service.get_result(run_id)
                }
            };
            let Some(state) = state else {
                bail!("Run {run_id} finished without a result");
            };

            let output = if pretty {
                serde_json::to_string_pretty(&state)?
            } else {
                serde_json::to_string(&state)?
            };
            println!("{output}");
        }
        Command::Outcome { record, label } => {
            if config.memory.sqlite_path.is_none() {
                bail!("memory.sqlite_path is not configured; outcomes need a persistent store");
            }
            let service = AnalysisService::new(radar::build_orchestrator(&config, &context));
            service
                .record_outcome(record, &label)
                .with_context(|| format!("Failed to record outcome for {record}"))?;
            println!("Recorded outcome {label:?} for {record}");
        }
        Command::Prune { max_age_days } => {
            let report = radar::prune(&context, chrono::Duration::days(max_age_days))?;
            println!(
                "Pruned {} memory records and {} cached entries",
                report.memory_records, report.cached_entries
            );
        }
    }

    Ok(())
}
