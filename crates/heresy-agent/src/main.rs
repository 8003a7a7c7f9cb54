//! Heresy Agent Binary
//!
//! Runs the agent against an in-process scope, for exercising a controller
//! without an instrumented target.

use anyhow::Result;
use clap::Parser;
use heresy_agent::{Agent, ChannelConfig, GlobalScope};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "heresy-agent", about = "Heresy agent connecting back to a controller")]
struct Args {
    /// Controller address
    #[arg(long, default_value = "ws://127.0.0.1:1337")]
    rpc: String,

    /// Do not reconnect when the controller drops the connection
    #[arg(long)]
    no_reconnect: bool,
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
    info!("Starting Heresy agent");

    let config = ChannelConfig::new(args.rpc).reconnect(!args.no_reconnect);
    let agent = Agent::connect(config, GlobalScope::from_process());

    tokio::select! {
        _ = agent.run() => info!("Channel closed"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    info!("Agent shutting down");
    Ok(())
}
