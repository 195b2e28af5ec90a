//! Shared utilities for integration testing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use item_gateway::backend::ItemService;
use item_gateway::config::ServiceConfig;
use item_gateway::rpc::RpcServer;
use item_gateway::store::MemoryStore;
use item_gateway::{GatewayServer, Shutdown};
use tokio::net::TcpListener;

/// A backend process running in the test runtime.
pub struct TestBackend {
    pub addr: SocketAddr,
    pub store: Arc<MemoryStore>,
    pub shutdown: Shutdown,
}

impl TestBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

/// Start an RPC backend over `store` on `addr` (use port 0 for any port).
pub async fn start_backend_on(addr: SocketAddr, store: Arc<MemoryStore>) -> TestBackend {
    let listener = TcpListener::bind(addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let service = Arc::new(ItemService::new(store.clone(), Duration::from_millis(500)));
    let shutdown = Shutdown::new();

    tokio::spawn(RpcServer::new(service).run(listener, shutdown.subscribe()));

    TestBackend {
        addr,
        store,
        shutdown,
    }
}

pub async fn start_backend() -> TestBackend {
    start_backend_on(
        "127.0.0.1:0".parse().unwrap(),
        Arc::new(MemoryStore::default()),
    )
    .await
}

/// An address nothing is listening on (yet).
pub async fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Config with short timings so recovery paths run within a test.
pub fn fast_config(backend_url: &str) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.backend.url = backend_url.to_string();
    config.backend.rpc_timeout_ms = 500;
    config.retries.max_attempts = 2;
    config.retries.base_delay_ms = 20;
    config.retries.max_delay_ms = 50;
    config.retries.jitter_ratio = 0.0;
    config.circuit_breaker.failure_threshold = 3;
    config.circuit_breaker.reset_timeout_secs = 1;
    config.health_check.interval_secs = 1;
    config.health_check.timeout_ms = 300;
    config.gateway.request_timeout_secs = 5;
    config
}

/// Start a gateway and return its base URL and shutdown handle.
pub async fn start_gateway(config: ServiceConfig) -> (String, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let server = GatewayServer::new(config).unwrap();
    tokio::spawn(server.run(listener, shutdown.clone()));

    (format!("http://{addr}"), shutdown)
}

/// Poll `check` until it returns true or `deadline` passes.
pub async fn eventually<F, Fut>(deadline: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let stop = tokio::time::Instant::now() + deadline;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= stop {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
