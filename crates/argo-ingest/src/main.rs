//! ARGO Ingest - incremental NetCDF to CSV pipeline

use std::sync::Arc;

use anyhow::{Context, Result};
use argo_common::logging::{init_logging, LogConfig};
use argo_ingest::scheduler::shutdown_signal;
use argo_ingest::{IngestConfig, Pipeline, Scheduler, TriggerMode};
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "argo-ingest")]
#[command(author, version, about = "Incremental ARGO float data ingestion")]
struct Cli {
    /// Run mode (defaults to scheduled)
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Parser, Debug)]
enum Mode {
    /// Run now, then weekly on the configured schedule
    Scheduled,

    /// Run once and exit
    Manual,
}

/// No subcommand means scheduled
fn trigger_mode(mode: Option<Mode>) -> TriggerMode {
    match mode {
        Some(Mode::Manual) => TriggerMode::Manual,
        Some(Mode::Scheduled) | None => TriggerMode::Scheduled,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let log_config = LogConfig::builder()
        .log_file_prefix("argo-ingest")
        .filter_directives("hyper=warn,reqwest=warn,html5ever=warn")
        .build()
        .merge_env()?;
    let _log_guard = init_logging(&log_config)?;

    let config = IngestConfig::from_env().context("Invalid ingestion configuration")?;
    let pipeline = Arc::new(Pipeline::new(config)?);

    match trigger_mode(cli.mode) {
        TriggerMode::Manual => {
            info!("Running manual ingestion");
            let summary = pipeline.run().await?;
            println!("{summary}");
        },
        TriggerMode::Scheduled => {
            let scheduler = Scheduler::new(pipeline)?;
            info!("Scheduler will run on the configured cron schedule; press Ctrl+C to stop");
            scheduler.run_until(shutdown_signal()).await;
        },
    }

    Ok(())
}
