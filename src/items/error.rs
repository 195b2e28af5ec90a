//! Domain errors: final answers that are never retried.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::items::types::ItemId;

/// A correct, final answer from the backend.
///
/// Domain errors never trigger a retry, never count against the circuit
/// breaker and never cause a request to be queued.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DomainError {
    /// Another item already uses this id.
    #[error("Item with id {0} already exists")]
    DuplicateId(ItemId),

    /// Another item already uses this name.
    #[error("Item name '{0}' is already in use")]
    DuplicateName(String),

    /// No item with this id.
    #[error("Item with id {0} not found")]
    NotFound(ItemId),

    /// No item name contains the query.
    #[error("No items found matching '{0}'")]
    NoMatch(String),

    /// The request is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl DomainError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::DuplicateId(_) => "duplicate_id",
            DomainError::DuplicateName(_) => "duplicate_name",
            DomainError::NotFound(_) => "not_found",
            DomainError::NoMatch(_) => "no_match",
            DomainError::InvalidRequest(_) => "invalid_request",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_serde() {
        let err = DomainError::DuplicateName("Test Item".into());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, r#"{"kind":"duplicate_name","value":"Test Item"}"#);
        let back: DomainError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
        assert_eq!(back.code(), "duplicate_name");
    }
}
