//! Passive market-making engine - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Passive market-making engine for a single spot pair.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via PMM_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .or_else(|| std::env::var("PMM_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = pmm_bot::AppConfig::from_file(&config_path)?;
    pmm_telemetry::init_logging(&config.telemetry)?;

    info!("Starting pmm-bot v{}", env!("CARGO_PKG_VERSION"));
    info!(config_path = %config_path, symbol = %config.strategy.symbol, "Configuration loaded");

    let mut app = pmm_bot::Application::new(config)?;
    app.start().await;

    tokio::signal::ctrl_c().await?;
    info!("interrupt received");
    app.shutdown().await;

    Ok(())
}
