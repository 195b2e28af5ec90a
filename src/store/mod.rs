//! Backend Store Adapter.
//!
//! # Data Flow
//! ```text
//! ItemService
//!     → ItemStore trait (find / find_by_name / insert / replace / remove / ping)
//!     → memory.rs (in-process document collection, optional JSON persistence)
//! ```
//!
//! # Design Decisions
//! - The store is an opaque dependency; it may fail with a transient error
//!   on any call and the service treats that as such
//! - Unique indexes on `id` and `name` are enforced by the store too, so a
//!   lost race surfaces as `StoreError::Conflict` rather than a duplicate row
//! - "Not found" is `Ok(None)`, never an error

pub mod memory;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::items::{Item, ItemId};

pub use memory::MemoryStore;

/// Which unique index rejected a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueIndex {
    Id,
    Name,
}

/// Errors raised by a store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store did not answer in time.
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// A unique index rejected the write.
    #[error("unique index on {index:?} rejected value {value}")]
    Conflict { index: UniqueIndex, value: String },

    /// Persistence failed.
    #[error("store I/O error: {0}")]
    Io(String),
}

impl StoreError {
    /// Unavailable, timeouts and I/O failures may succeed on another try.
    pub fn is_transient(&self) -> bool {
        !matches!(self, StoreError::Conflict { .. })
    }
}

/// The document-store operations the backend consumes.
#[async_trait]
pub trait ItemStore: Send + Sync + 'static {
    /// Look up one item by id.
    async fn find(&self, id: ItemId) -> Result<Option<Item>, StoreError>;

    /// All items whose name contains `pattern` (case-insensitive), in id order.
    async fn find_by_name(&self, pattern: &str) -> Result<Vec<Item>, StoreError>;

    /// Insert a new item.
    async fn insert(&self, item: Item) -> Result<(), StoreError>;

    /// Replace the item stored under `id`, returning the previous document.
    async fn replace(&self, id: ItemId, item: Item) -> Result<Option<Item>, StoreError>;

    /// Remove the item stored under `id`, returning it.
    async fn remove(&self, id: ItemId) -> Result<Option<Item>, StoreError>;

    /// Cheap liveness check.
    async fn ping(&self) -> Result<(), StoreError>;
}
