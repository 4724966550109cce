use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod middleware;

use config::{LogFormat, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "reqhub")]
#[command(about = "Requirements management backend speaking MCP", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "REQHUB_CONFIG", default_value = "reqhub.toml")]
    config: PathBuf,

    /// Data directory for storage
    #[arg(short, long, env = "REQHUB_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Port to listen on
    #[arg(short, long, env = "REQHUB_PORT", default_value = "8080")]
    port: u16,

    /// Host to bind to
    #[arg(long, env = "REQHUB_HOST", default_value = "127.0.0.1")]
    host: String,
}

fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));

    match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logging settings live in the config file, so load it first
    let config = ServerConfig::load(&args.config, args.data_dir)?;
    init_tracing(&config);

    tracing::info!("Starting Reqhub");
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!(backend = ?config.storage.backend, "Storage backend");

    // Start API server
    let addr = format!("{}:{}", args.host, args.port);
    tracing::info!("Starting API server on {}", addr);

    api::serve(&addr, config).await?;

    Ok(())
}
