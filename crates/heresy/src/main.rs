//! Heresy Controller Binary
//!
//! Loads the project configuration, prepares the injection parameters and
//! serves the operator console to connecting agents.

use anyhow::{Context, Result};
use clap::Parser;
use heresy::config::{read_scripts, DEFAULT_CONFIG_PATH, DEFAULT_CORE_PATH};
use heresy::{AppConfig, BroadcastServer};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "heresy", about = "Drive code inside an instrumented React Native target")]
struct Args {
    /// Project configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Listen port; overrides `rpc_port` from the configuration
    #[arg(long)]
    port: Option<u16>,

    /// Built agent core script
    #[arg(long, default_value = DEFAULT_CORE_PATH)]
    core: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match AppConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let params = read_scripts(&config, &args.core).context("Failed to read injection scripts")?;
    let payloads = params.validate().context("Invalid injection parameters")?;
    info!(
        package = %payloads.package_name,
        before = payloads.before.len(),
        after = payloads.after.len(),
        "Injection parameters ready"
    );

    if config.heresy_config.rpc_url().is_none() {
        info!("RPC disabled in heresy_config, not starting the server");
        return Ok(());
    }

    let port = args.port.unwrap_or(config.rpc_port);
    let server = Arc::new(BroadcastServer::new().with_console(BufReader::new(tokio::io::stdin())));
    let (_, accept_loop) = server
        .bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to listen on port {}", port))?;

    tokio::select! {
        result = accept_loop => {
            if let Err(e) = result {
                error!("Accept loop ended abnormally: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    info!("Controller shutting down");
    Ok(())
}
