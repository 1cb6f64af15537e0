//! resilient-db
//!
//! Operational entry point for the connection layer.
//!
//! ```text
//! resilient-db [--config FILE] check   initialize, print status as JSON, dispose
//! resilient-db [--config FILE] watch   initialize, monitor health until SIGINT/SIGTERM
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use resilient_db::config::load_config;
use resilient_db::health::HealthMonitor;
use resilient_db::lifecycle::{signals, start, Shutdown};
use resilient_db::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "resilient-db", version, about = "Resilient Postgres connection manager")]
struct Cli {
    /// TOML configuration file. Environment variables override its values.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect once and print the manager status.
    Check,
    /// Connect and keep monitoring database health.
    Watch,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    logging::init_logging(&config.observability.log_level, config.log_format())?;

    tracing::info!(
        environment = %config.environment,
        uri = %config.redacted_uri(),
        pool_size = config.pool_size(),
        max_overflow = config.max_overflow(),
        failure_threshold = config.circuit_breaker_failure_threshold(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let manager = start(config).await?;

    match cli.command {
        Command::Check => {
            println!("{}", serde_json::to_string_pretty(&manager.status())?);
        }
        Command::Watch => {
            let shutdown = Shutdown::new();
            let monitor = tokio::spawn(HealthMonitor::new(manager.clone()).run(shutdown.subscribe()));

            signals::wait_for_shutdown_signal().await;
            shutdown.trigger();
            if let Err(e) = monitor.await {
                tracing::error!(error = %e, "Health monitor task failed");
            }
        }
    }

    manager.dispose().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
