//! Item domain model shared by the backend and the gateway.
//!
//! # Invariants
//! - No two items share an `id`
//! - No two items share a `name`
//! - Both are enforced when an item is added and when it is renamed

pub mod error;
pub mod types;

pub use error::DomainError;
pub use types::{Item, ItemChange, ItemId, ItemOperation, OperationOutcome};
