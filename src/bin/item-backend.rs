use clap::Parser;
use std::path::PathBuf;

use item_gateway::config::load_config;
use item_gateway::lifecycle::{self, signals, Shutdown};

#[derive(Parser)]
#[command(name = "item-backend")]
#[command(about = "Item backend service: store, cache and RPC endpoint", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "ITEM_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    lifecycle::init_observability(&config, "item_gateway=debug,tower_http=info");
    tracing::info!("item-backend v{} starting", env!("CARGO_PKG_VERSION"));

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    lifecycle::run_backend(config, shutdown).await?;
    Ok(())
}
