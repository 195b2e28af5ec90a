//! Gateway core: resilience composition in front of the backend.
//!
//! # Responsibilities
//! - Decide per request: call now, queue, or fail fast
//! - Run every backend call as breaker → retry → timed attempt
//! - Map backend failures into client-facing errors
//!
//! # Design Decisions
//! - The backend is reached through the `ItemBackend` trait so the RPC
//!   client and test fakes are interchangeable
//! - Reads are never queued; only writes have a meaningful deferred outcome

pub mod backend;
pub mod service;
#[cfg(test)]
pub(crate) mod testing;

pub use backend::{BackendHealth, CallError, ItemBackend};
pub use service::{Gateway, GatewayError, GatewayStatus, Submission};
