//! Item gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!  HTTP client
//!      │
//!      ▼
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │ http (axum)  request id │ timeout │ trace                    │
//!  │      │                                                       │
//!  │      ▼                                                       │
//!  │ gateway ── queue ──┐         health prober (own task)        │
//!  │      │             │              │ availability flags       │
//!  │      ▼             ▼              ▼                          │
//!  │ circuit breaker (actor) → retry → timed RPC attempt          │
//!  └──────────────────────────────────┬───────────────────────────┘
//!                                     │ JSON / NDJSON over HTTP
//!                                     ▼
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │ item-backend: rpc server → item service → cache → store      │
//!  └──────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use item_gateway::config::load_config;
use item_gateway::lifecycle::{self, signals, Shutdown};

#[derive(Parser)]
#[command(name = "item-gateway")]
#[command(about = "Resilient HTTP gateway for the item backend", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "ITEM_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    lifecycle::init_observability(&config, "item_gateway=debug,tower_http=debug");
    tracing::info!("item-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    lifecycle::run_gateway(config, shutdown).await?;
    Ok(())
}
