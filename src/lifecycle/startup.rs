//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize logging and metrics from the loaded configuration
//! - Initialize each process's subsystems in dependency order
//! - Bind listeners and begin accepting traffic
//! - Persist backend state on the way out
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::backend::ItemService;
use crate::config::{ConfigError, ServiceConfig};
use crate::http::GatewayServer;
use crate::lifecycle::Shutdown;
use crate::observability::{logging, metrics};
use crate::rpc::{ClientBuildError, RpcServer};
use crate::store::MemoryStore;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Client(#[from] ClientBuildError),

    #[error("failed to load store from {path}: {source}")]
    StoreLoad {
        path: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Install logging, then the metrics exporter if enabled.
pub fn init_observability(config: &ServiceConfig, default_directives: &str) {
    logging::init_logging(&config.observability, default_directives);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");
    Ok(listener)
}

/// Run the gateway process until `shutdown` fires.
pub async fn run_gateway(config: ServiceConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    tracing::info!(
        bind_address = %config.gateway.bind_address,
        backend = %config.backend.url,
        failure_threshold = config.circuit_breaker.failure_threshold,
        max_attempts = config.retries.max_attempts,
        "Configuration loaded"
    );

    let listener = bind(&config.gateway.bind_address).await?;
    let server = GatewayServer::new(config)?;
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Run the backend process until `shutdown` fires, then persist the store.
pub async fn run_backend(config: ServiceConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    let store = match &config.backend.persistence_path {
        Some(path) => MemoryStore::load_from_file(Path::new(path)).map_err(|source| {
            StartupError::StoreLoad {
                path: path.clone(),
                source,
            }
        })?,
        None => MemoryStore::new(None),
    };
    let store = Arc::new(store);
    let service = Arc::new(ItemService::new(store.clone(), config.backend.store_timeout()));

    tracing::info!(
        bind_address = %config.backend.bind_address,
        items = store.len(),
        "Configuration loaded"
    );

    let listener = bind(&config.backend.bind_address).await?;
    RpcServer::new(service).run(listener, shutdown.subscribe()).await?;

    if let Err(e) = store.save_to_file() {
        tracing::error!(error = %e, "Failed to persist store");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
