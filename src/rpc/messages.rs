//! Wire messages exchanged between the gateway and the backend.

use serde::{Deserialize, Serialize};

use crate::items::{DomainError, Item, ItemId};

/// `GetItem` request: by id, or by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ItemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateItemRequest {
    pub id: ItemId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteItemRequest {
    pub id: ItemId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddItemResponse {
    pub result: bool,
    pub item: Item,
}

/// A single `GetItem` result; also one line of the name stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetItemResponse {
    pub result: bool,
    pub requested_item: Item,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lap: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateItemResponse {
    pub result: bool,
    pub old_item: Item,
    pub new_item: Item,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteItemResponse {
    pub result: bool,
    pub deleted_item: Item,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub result: bool,
    pub store: bool,
}

/// Body of every failed call. `error` is set for domain refusals and absent
/// for store failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcFailure {
    pub result: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DomainError>,
}

/// One line of the NDJSON name stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamFrame {
    Item(GetItemResponse),
    Failure(RpcFailure),
}

/// Content type of the name stream.
pub const NDJSON: &str = "application/x-ndjson";
