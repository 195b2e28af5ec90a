//! The gateway's view of the backend service.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::items::{DomainError, Item, ItemChange, ItemId};
use crate::resilience::Transient;

/// Failure of one call from the gateway to the backend.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// The backend answered and refused the request.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Connection refused or reset, or the backend reported a store failure.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered with something we could not read.
    #[error("backend protocol error: {0}")]
    Protocol(String),
}

impl Transient for CallError {
    fn is_transient(&self) -> bool {
        matches!(self, CallError::Unavailable(_) | CallError::Timeout(_))
    }
}

/// What a successful ping tells us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendHealth {
    pub store_available: bool,
}

/// Item operations as exposed by the backend service.
#[async_trait]
pub trait ItemBackend: Send + Sync + 'static {
    async fn add_item(&self, item: &Item) -> Result<Item, CallError>;

    async fn get_item(&self, id: ItemId) -> Result<Item, CallError>;

    /// Matches for `name` from the wrap-around stream. With `limit` of
    /// `None`, exactly one lap is returned.
    async fn find_by_name(&self, name: &str, limit: Option<usize>) -> Result<Vec<Item>, CallError>;

    async fn update_item(&self, id: ItemId, name: &str) -> Result<ItemChange, CallError>;

    async fn delete_item(&self, id: ItemId) -> Result<Item, CallError>;

    async fn ping(&self) -> Result<BackendHealth, CallError>;
}
