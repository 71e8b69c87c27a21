//! tidewatch-worker: runs the detection scheduler until interrupted.
//!
//! Loads detection functions from a TOML file, series from a JSON fixture,
//! and optionally restores/saves store snapshots around the run. With
//! `--backfill-function` it evaluates one range ad hoc and exits instead.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use tidewatch_core::config::{load_dotenv, Config};
use tidewatch_scheduler::{DataSource, InMemoryDataSource, Scheduler, SchedulerConfig};
use tidewatch_store::Stores;

// ── CLI ─────────────────────────────────────────────────────────────

/// Anomaly detection worker running fixed-delay week-over-week evaluation.
#[derive(Parser, Debug)]
#[command(name = "tidewatch-worker", version, about)]
struct Cli {
    /// Path to the scheduler TOML config.
    #[arg(long, env = "TIDEWATCH_CONFIG", default_value = "config/tidewatch.toml")]
    config: PathBuf,

    /// JSON fixture with the series to evaluate.
    #[arg(long, env = "TIDEWATCH_FIXTURE")]
    fixture: Option<PathBuf>,

    /// Shutdown timeout in seconds.
    #[arg(long, env = "TIDEWATCH_SHUTDOWN_TIMEOUT", default_value_t = 10)]
    shutdown_timeout: u64,

    /// Backfill this function id instead of running the scheduler.
    #[arg(long, requires_all = ["backfill_start", "backfill_end"])]
    backfill_function: Option<u64>,

    /// Backfill range start, epoch milliseconds.
    #[arg(long)]
    backfill_start: Option<i64>,

    /// Backfill range end (exclusive), epoch milliseconds.
    #[arg(long)]
    backfill_end: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let env = Config::from_env();
    env.log_summary();

    let config = match SchedulerConfig::load(&cli.config, &env) {
        Ok(config) => {
            info!(
                path = %cli.config.display(),
                functions = config.functions.len(),
                "loaded scheduler config"
            );
            config
        }
        Err(e) => {
            warn!(
                error = %e,
                path = %cli.config.display(),
                "failed to load scheduler config, using environment defaults"
            );
            SchedulerConfig::from_env(&env)
        }
    };

    let source: Arc<dyn DataSource> = match &cli.fixture {
        Some(path) => Arc::new(
            InMemoryDataSource::from_fixture_file(path)
                .with_context(|| format!("loading fixture {}", path.display()))?,
        ),
        None => {
            warn!("no fixture given; every fetch will report missing data");
            Arc::new(InMemoryDataSource::new())
        }
    };

    let stores = Stores::in_memory();
    if let Some(dir) = &env.storage.snapshot_dir {
        stores
            .load_snapshots(dir)
            .await
            .with_context(|| format!("restoring snapshots from {}", dir.display()))?;
    }

    let scheduler = Arc::new(Scheduler::new(config, stores.clone(), source));

    if let (Some(function_id), Some(start), Some(end)) =
        (cli.backfill_function, cli.backfill_start, cli.backfill_end)
    {
        let summary = scheduler.run_backfill(function_id, start, end).await?;
        info!(
            function_id,
            resumed_from = summary.resumed_from,
            runs = summary.runs.len(),
            failed = summary.failed_runs(),
            "backfill done"
        );
    } else {
        scheduler.start()?;
        tokio::signal::ctrl_c().await?;
        info!("interrupt received, shutting down");
        if !scheduler
            .stop(Duration::from_secs(cli.shutdown_timeout))
            .await
        {
            warn!("in-flight runs did not finish before the shutdown timeout");
        }
    }

    if let Some(dir) = &env.storage.snapshot_dir {
        std::fs::create_dir_all(dir)?;
        stores.save_snapshots(dir).await?;
    }
    Ok(())
}
