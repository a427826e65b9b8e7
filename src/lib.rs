// dns2parquet - load captured DNS traffic into partitioned Parquet tables
//
// Every cycle refreshes the enrichment data, processes each configured name
// server in turn and hands the new partitions to the query engine.
//
// Features:
// - Per-source failure isolation (errors and panics)
// - One bounded Parquet file per partition and run
// - Background partition registration and compaction with retries
// - Structured logging with tracing
// - Graceful shutdown after the in-flight cycle

use anyhow::{Context, Result};
use dns2parquet_config::RuntimeConfig;
use dns2parquet_engine::{RegistrationSupervisor, RetryPolicy};
use dns2parquet_writer::set_parquet_row_group_size;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

pub mod context;
pub mod decode;
pub mod enrich;
mod init;
pub mod processor;
pub mod record;
pub mod scheduler;

pub use init::{build_scheduler, init_tracing};
pub use scheduler::{CycleReport, RunOutcome, Scheduler};

/// How long shutdown waits for outstanding registration tasks.
const ENGINE_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Run cycles on the configured delay until SIGINT/SIGTERM.
    Serve,
    /// Run a single cycle and exit.
    Once,
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, finishing current cycle before shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, finishing current cycle before shutdown...");
        },
    }
}

/// Entry point with configuration loaded from the environment and default files
pub async fn run(mode: RunMode) -> Result<()> {
    let config = RuntimeConfig::load().context("Failed to load configuration")?;
    run_with_config(config, mode).await
}

/// Entry point with pre-loaded configuration (for CLI usage)
pub async fn run_with_config(config: RuntimeConfig, mode: RunMode) -> Result<()> {
    init_tracing(&config);

    // Configure Parquet writer properties before first use
    set_parquet_row_group_size(config.output.row_group_size);

    info!(
        input = %config.input.location,
        output = %config.output.location,
        table = %config.output.table,
        name_servers = %config.input.name_servers,
        delay_secs = config.schedule.delay_secs,
        "Starting dns2parquet"
    );

    let engine = init::build_engine(&config)?;
    let supervisor = Arc::new(RegistrationSupervisor::new(
        engine,
        tokio::runtime::Handle::current(),
        RetryPolicy::new(config.engine.max_retries),
    ));
    let scheduler = Arc::new(build_scheduler(&config, Some(supervisor.clone()))?);

    match mode {
        RunMode::Once => {
            run_cycle(&scheduler).await?;
        }
        RunMode::Serve => {
            serve(&scheduler, Duration::from_secs(config.schedule.delay_secs)).await;
        }
    }

    if !supervisor.shutdown(ENGINE_DRAIN_TIMEOUT).await {
        error!("Some partitions may not be registered with the query engine");
    }
    info!("Shutdown complete");
    Ok(())
}

/// Run one cycle on the blocking pool.
pub async fn run_cycle(scheduler: &Arc<Scheduler>) -> Result<CycleReport> {
    let scheduler = scheduler.clone();
    tokio::task::spawn_blocking(move || scheduler.run_cycle())
        .await
        .context("Processing cycle aborted")
}

/// Fixed-delay loop: the delay starts when a cycle ends, so cycles never overlap.
async fn serve(scheduler: &Arc<Scheduler>, delay: Duration) {
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!(delay_secs = delay.as_secs(), "Press Ctrl+C or send SIGTERM to stop");

    loop {
        let mut cycle = Box::pin(run_cycle(scheduler));
        let mut stopping = false;

        let result = tokio::select! {
            result = &mut cycle => result,
            _ = &mut shutdown => {
                stopping = true;
                cycle.await
            }
        };

        if let Err(e) = result {
            error!(error = %format!("{:#}", e), "Processing cycle failed");
        }
        if stopping {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown => break,
        }
    }
}
