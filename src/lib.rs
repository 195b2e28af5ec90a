//! Item gateway and backend library.

pub mod backend;
pub mod config;
pub mod gateway;
pub mod health;
pub mod http;
pub mod items;
pub mod lifecycle;
pub mod observability;
pub mod queue;
pub mod resilience;
pub mod rpc;
pub mod store;

pub use config::ServiceConfig;
pub use gateway::Gateway;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
