//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, request timeout, body limit, request ID)
//! - Assemble the gateway: breaker, queue, prober, drainer
//! - Spawn the background tasks and bind the server to its listener

use axum::{
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServiceConfig;
use crate::gateway::{Gateway, ItemBackend};
use crate::health::{self, BackendProbe, HealthProber};
use crate::http::handlers::{self, AppState};
use crate::lifecycle::Shutdown;
use crate::queue::{self, QueueDrainer, RequestQueue};
use crate::rpc::{ClientBuildError, RpcClient};

/// Larger request bodies are refused with 413.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// HTTP server for the item gateway.
pub struct GatewayServer {
    config: ServiceConfig,
    backend: Arc<dyn ItemBackend>,
}

impl GatewayServer {
    /// Create a server talking to the backend at `config.backend.url`.
    pub fn new(config: ServiceConfig) -> Result<Self, ClientBuildError> {
        let client = RpcClient::new(&config.backend.url, config.backend.rpc_timeout())?;
        Ok(Self::with_backend(config, Arc::new(client)))
    }

    /// Create a server over any backend implementation.
    pub fn with_backend(config: ServiceConfig, backend: Arc<dyn ItemBackend>) -> Self {
        Self { config, backend }
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backend = %self.config.backend.url,
            "Gateway server starting"
        );

        let (publisher, availability) = health::state::channel();
        let (queue, dead_letters) = RequestQueue::new(self.config.queue.clone());
        let gateway = Arc::new(Gateway::new(
            self.backend.clone(),
            &self.config,
            Arc::new(queue),
            availability.clone(),
        ));
        let drain = Arc::new(Notify::new());

        let prober = HealthProber::new(
            vec![Box::new(BackendProbe::new(self.backend.clone()))],
            publisher,
            self.config.health_check.clone(),
            drain.clone(),
        );
        tokio::spawn(prober.run(shutdown.subscribe()));

        let drainer = QueueDrainer::new(gateway.clone(), availability, drain);
        tokio::spawn(drainer.run(shutdown.subscribe()));
        tokio::spawn(queue::log_dead_letters(dead_letters));

        let app = build_router(&self.config, AppState { gateway });
        let mut stop = shutdown.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
                tracing::info!("Gateway server received shutdown signal");
            })
            .await?;

        tracing::info!("Gateway server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub(crate) fn build_router(config: &ServiceConfig, state: AppState) -> Router {
    Router::new()
        .route("/items", get(handlers::find_items).post(handlers::create_item))
        .route(
            "/items/{id}",
            get(handlers::get_item)
                .put(handlers::update_item)
                .delete(handlers::delete_item),
        )
        .route("/requests/{ticket}", get(handlers::ticket_status))
        .route("/status", get(handlers::status))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.gateway.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
