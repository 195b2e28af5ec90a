//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, tracing)
//!     → handlers.rs (extract, build ItemOperation / lookup)
//!     → gateway::Gateway (call now, queue, or fail fast)
//!     → response.rs (status mapping, Retry-After, ticket links)
//!     → Send to client
//! ```

pub mod handlers;
pub mod response;
pub mod server;

pub use server::GatewayServer;
