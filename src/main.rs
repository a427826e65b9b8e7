use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dns2parquet::RunMode;
use dns2parquet_config::RuntimeConfig;
use std::path::PathBuf;

/// Load captured DNS traffic per name server into partitioned Parquet tables
#[derive(Parser)]
#[command(name = "dns2parquet")]
#[command(version)]
#[command(about = "Load captured DNS traffic per name server into partitioned Parquet tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Input base directory (overrides config file)
    #[arg(short, long, value_name = "DIR", global = true)]
    input: Option<PathBuf>,

    /// Output base directory for Parquet files (overrides config file)
    #[arg(short, long, value_name = "DIR", global = true)]
    output: Option<PathBuf>,

    /// Comma-separated name servers, empty for the input directory itself
    #[arg(short = 'n', long, value_name = "LIST", global = true)]
    name_servers: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run processing cycles until interrupted (default if no subcommand given)
    Serve,
    /// Run a single processing cycle and exit
    Once,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mode = match cli.command {
        Some(Commands::Once) => RunMode::Once,
        Some(Commands::Serve) | None => RunMode::Serve,
    };

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(cli, mode))
}

async fn async_main(cli: Cli, mode: RunMode) -> Result<()> {
    // Step 1: Load base configuration
    let mut config = if let Some(config_path) = &cli.config {
        RuntimeConfig::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        RuntimeConfig::load_or_default().context("Failed to load configuration")?
    };

    // Step 2: Apply CLI overrides (highest priority)
    apply_cli_overrides(&mut config, &cli);
    config.validate()?;

    // Step 3: Initialize tracing early so startup info shows up
    // run_with_config calls init_tracing again, which is a no-op
    dns2parquet::init_tracing(&config);
    display_startup_info(&config, mode);

    dns2parquet::run_with_config(config, mode).await
}

fn apply_cli_overrides(config: &mut RuntimeConfig, cli: &Cli) {
    if let Some(input) = &cli.input {
        config.input.location = input.to_string_lossy().to_string();
    }

    if let Some(output) = &cli.output {
        config.output.location = output.to_string_lossy().to_string();
    }

    if let Some(name_servers) = &cli.name_servers {
        config.input.name_servers = name_servers.clone();
    }

    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
}

fn display_startup_info(config: &RuntimeConfig, mode: RunMode) {
    use tracing::info;

    info!("╭─────────────────────────────────────────────────");
    info!("│ dns2parquet v{}", env!("CARGO_PKG_VERSION"));
    info!("├─────────────────────────────────────────────────");
    info!("│ Mode: {:?}", mode);
    info!("│ Input directory: {}", config.input.location);
    if config.input.name_servers.trim().is_empty() {
        info!("│ Name servers: (input directory)");
    } else {
        info!("│ Name servers: {}", config.input.name_servers);
    }
    info!("│ Archive: {} ({})", config.input.archive, config.input.archive_mode);
    info!("│ Output: {}/{}", config.output.location, config.output.table);
    info!("│ Query engine: {}", config.engine.kind);
    if let Some(endpoint) = &config.engine.endpoint {
        info!("│   - Endpoint: {}", endpoint);
    }
    if mode == RunMode::Serve {
        info!("│ Delay between cycles: {}s", config.schedule.delay_secs);
    }
    info!("╰─────────────────────────────────────────────────");
}
