//! perpgate - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Exchange gateway and market data process
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via PERPGATE_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // CLI arg > PERPGATE_CONFIG > default
    let config_path = args
        .config
        .or_else(|| std::env::var("PERPGATE_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = perpgate_bot::AppConfig::from_file(&config_path)?;

    perpgate_telemetry::init_logging(config.telemetry.log_filter.as_deref())?;
    info!("Starting perpgate v{}", env!("CARGO_PKG_VERSION"));
    info!(
        config_path = %config_path,
        environment = ?config.exchange.environment,
        base_url = %config.exchange.active().base_url,
        "Configuration loaded"
    );

    let app = perpgate_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
