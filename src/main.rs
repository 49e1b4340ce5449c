use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

mod cache;
mod config;
mod logging;
mod provider;
mod refresher;
mod server;
mod snapshot;
mod view;

use crate::cache::ConfigCache;
use crate::refresher::RefreshTask;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the service configuration file
    #[arg(short, long, default_value = "/etc/ai-config-display/config.yml")]
    config_path: PathBuf,

    /// Path to the log directory
    #[arg(short, long, default_value = "/var/log/ai-config-display")]
    log_dir: PathBuf,

    /// Log rotation duration (hourly, daily, never)
    #[arg(short = 'r', long, default_value = "daily")]
    log_rotation: String,

    /// Address to listen on, overrides the configuration file
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// API key for the http provider, overrides the configuration file
    #[arg(long, env = "AI_CONFIG_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Parse log rotation setting
    let rotation = logging::parse_rotation(&args.log_rotation)
        .context("Failed to parse log rotation setting")?;

    // Initialize logging
    logging::init(&args.log_dir, rotation).context("Failed to initialize logging")?;
    info!("Starting AI config display");

    // Run until shutdown; startup and runtime errors both end the process
    match run(args).await {
        Ok(()) => {
            info!("Server stopped gracefully");
            Ok(())
        }
        Err(e) => {
            error!("Server terminated with error: {:#}", e);
            process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<()> {
    // Load configuration
    let mut config = config::load_config(&args.config_path)
        .context("Failed to load configuration")?;

    // Command line values override the configuration file
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(api_key) = args.api_key {
        config.override_api_key(api_key);
    }

    // Create the provider; a missing credential is fatal
    let provider = provider::build_provider(&config.provider, config.fetch_timeout())
        .context("Failed to create configuration provider")?;

    // Start refreshing into a cache that serves the default until the first fetch
    let cache = ConfigCache::new();
    let refresh = RefreshTask::new(
        cache.clone(),
        provider,
        config.refresh_interval(),
        config.fetch_timeout(),
    )
    .spawn();

    // Stop the server on Ctrl-C
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            // Hold the sender for good; the server stops if it is dropped
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    // Serve until shutdown, then stop the refresh task
    let served = server::start_server(config.listen, cache, shutdown_rx).await;

    refresh.stop().await?;
    served
}
