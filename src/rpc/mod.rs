//! RPC channel between the gateway and the backend.
//!
//! # Data Flow
//! ```text
//! Gateway ── client.rs (reqwest, JSON bodies, per-call deadline)
//!         ── HTTP ──→ server.rs (axum) → backend::ItemService
//! Name lookups come back as an NDJSON stream, one GetItemResponse per line.
//! ```

pub mod client;
pub mod messages;
pub mod server;

pub use client::{ClientBuildError, RpcClient};
pub use server::RpcServer;
