//! Item records and the write operations that can be queued for them.

use serde::{Deserialize, Serialize};

use crate::items::error::DomainError;

/// Item identity.
pub type ItemId = i64;

/// A stored item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
}

impl Item {
    pub fn new(id: ItemId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Reject ids that are not positive and blank names.
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_id(self.id)?;
        validate_name(&self.name)
    }
}

pub(crate) fn validate_id(id: ItemId) -> Result<(), DomainError> {
    if id <= 0 {
        return Err(DomainError::InvalidRequest(format!(
            "item id must be greater than 0, got {}",
            id
        )));
    }
    Ok(())
}

pub(crate) fn validate_name(name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::InvalidRequest(
            "item name must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Before/after snapshots of a rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemChange {
    pub old_item: Item,
    pub new_item: Item,
}

/// A write against the item collection.
///
/// Only writes are ever deferred by the gateway's request queue, so this is
/// the captured payload of a queued request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemOperation {
    Add { item: Item },
    Update { id: ItemId, name: String },
    Delete { id: ItemId },
}

impl ItemOperation {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ItemOperation::Add { .. } => "add",
            ItemOperation::Update { .. } => "update",
            ItemOperation::Delete { .. } => "delete",
        }
    }

    /// The item id this operation targets.
    pub fn item_id(&self) -> ItemId {
        match self {
            ItemOperation::Add { item } => item.id,
            ItemOperation::Update { id, .. } | ItemOperation::Delete { id } => *id,
        }
    }

    /// Shape checks that can be answered without the backend.
    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            ItemOperation::Add { item } => item.validate(),
            ItemOperation::Update { id, name } => {
                validate_id(*id)?;
                validate_name(name)
            }
            ItemOperation::Delete { id } => validate_id(*id),
        }
    }
}

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationOutcome {
    Added { item: Item },
    Updated { old_item: Item, new_item: Item },
    Deleted { item: Item },
}

impl From<ItemChange> for OperationOutcome {
    fn from(change: ItemChange) -> Self {
        OperationOutcome::Updated {
            old_item: change.old_item,
            new_item: change.new_item,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_validation() {
        assert!(Item::new(1, "widget").validate().is_ok());
        assert!(matches!(
            Item::new(0, "widget").validate(),
            Err(DomainError::InvalidRequest(_))
        ));
        assert!(matches!(
            Item::new(7, "   ").validate(),
            Err(DomainError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_operation_wire_shape() {
        let op = ItemOperation::Update {
            id: 4,
            name: "renamed".into(),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["kind"], "update");
        assert_eq!(json["id"], 4);
        assert_eq!(op.item_id(), 4);
        assert_eq!(op.kind(), "update");
    }
}
