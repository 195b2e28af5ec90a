//! Gateway-side client for the backend RPC endpoint.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::gateway::{BackendHealth, CallError, ItemBackend};
use crate::items::{DomainError, Item, ItemChange, ItemId};
use crate::resilience::with_timeout;
use crate::rpc::messages::{
    AddItemResponse, DeleteItemRequest, DeleteItemResponse, GetItemResponse, ItemQuery,
    PingResponse, RpcFailure, StreamFrame, UpdateItemRequest, UpdateItemResponse,
};

#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("invalid backend url: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// `ItemBackend` over HTTP/JSON. Every call, stream reads included, is
/// bounded by the configured deadline.
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    base: Url,
    timeout: Duration,
}

impl RpcClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientBuildError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("item-gateway/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base,
            timeout,
        })
    }

    fn endpoint(&self, method: &str) -> Result<Url, CallError> {
        self.base
            .join(&format!("rpc/{method}"))
            .map_err(|e| CallError::Protocol(e.to_string()))
    }

    async fn deadline<T>(&self, call: impl Future<Output = Result<T, CallError>>) -> Result<T, CallError> {
        with_timeout(self.timeout, call)
            .await
            .map_err(|elapsed| CallError::Timeout(elapsed.0))?
    }

    async fn call<Req, Resp>(&self, method: &str, body: &Req) -> Result<Resp, CallError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.endpoint(method)?;
        self.deadline(async {
            let response = self
                .http
                .post(url)
                .json(body)
                .send()
                .await
                .map_err(transport_error)?;
            decode(response).await
        })
        .await
    }

    async fn read_stream(response: Response, limit: Option<usize>) -> Result<Vec<Item>, CallError> {
        let mut body = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut items = Vec::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(transport_error)?;
            buffer.extend_from_slice(&chunk);

            while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=end).collect();
                let frame: StreamFrame = serde_json::from_slice(&line[..end])
                    .map_err(|e| CallError::Protocol(format!("bad stream frame: {e}")))?;

                match frame {
                    StreamFrame::Item(frame) => {
                        // A second lap has begun: one full lap is done.
                        if limit.is_none() && frame.lap.unwrap_or(1) > 1 {
                            return Ok(items);
                        }
                        items.push(frame.requested_item);
                        if limit.is_some_and(|limit| items.len() >= limit) {
                            return Ok(items);
                        }
                    }
                    // Every match vanished between laps.
                    StreamFrame::Failure(RpcFailure {
                        error: Some(DomainError::NoMatch(_)),
                        ..
                    }) if !items.is_empty() => return Ok(items),
                    StreamFrame::Failure(failure) => return Err(failure_error(failure)),
                }
            }
        }

        // The backend closed the stream early, e.g. while shutting down.
        if items.is_empty() {
            Err(CallError::Unavailable("name stream ended without results".into()))
        } else {
            Ok(items)
        }
    }
}

#[async_trait]
impl ItemBackend for RpcClient {
    async fn add_item(&self, item: &Item) -> Result<Item, CallError> {
        let response: AddItemResponse = self.call("AddItem", item).await?;
        Ok(response.item)
    }

    async fn get_item(&self, id: ItemId) -> Result<Item, CallError> {
        let query = ItemQuery {
            id: Some(id),
            name: None,
        };
        let response: GetItemResponse = self.call("GetItem", &query).await?;
        Ok(response.requested_item)
    }

    async fn find_by_name(&self, name: &str, limit: Option<usize>) -> Result<Vec<Item>, CallError> {
        let url = self.endpoint("GetItem")?;
        let query = ItemQuery {
            id: None,
            name: Some(name.to_string()),
        };
        self.deadline(async {
            let response = self
                .http
                .post(url)
                .json(&query)
                .send()
                .await
                .map_err(transport_error)?;
            if !response.status().is_success() {
                return Err(status_error(response).await);
            }
            Self::read_stream(response, limit).await
        })
        .await
    }

    async fn update_item(&self, id: ItemId, name: &str) -> Result<ItemChange, CallError> {
        let request = UpdateItemRequest {
            id,
            name: name.to_string(),
        };
        let response: UpdateItemResponse = self.call("UpdateItem", &request).await?;
        Ok(ItemChange {
            old_item: response.old_item,
            new_item: response.new_item,
        })
    }

    async fn delete_item(&self, id: ItemId) -> Result<Item, CallError> {
        let response: DeleteItemResponse = self.call("DeleteItem", &DeleteItemRequest { id }).await?;
        Ok(response.deleted_item)
    }

    async fn ping(&self) -> Result<BackendHealth, CallError> {
        let url = self.endpoint("Ping")?;
        let response: PingResponse = self
            .deadline(async {
                let response = self.http.get(url).send().await.map_err(transport_error)?;
                decode(response).await
            })
            .await?;
        Ok(BackendHealth {
            store_available: response.store,
        })
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, CallError> {
    if response.status().is_success() {
        response
            .json::<T>()
            .await
            .map_err(|e| CallError::Protocol(format!("bad response body: {e}")))
    } else {
        Err(status_error(response).await)
    }
}

async fn status_error(response: Response) -> CallError {
    let status = response.status();
    let failure = response.json::<RpcFailure>().await.ok();

    match failure {
        Some(failure) if status.is_client_error() || status.is_server_error() => failure_error(failure),
        _ if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
            CallError::Unavailable(format!("backend answered {status}"))
        }
        _ => CallError::Protocol(format!("unexpected status {status}")),
    }
}

fn failure_error(failure: RpcFailure) -> CallError {
    match failure.error {
        Some(error) => CallError::Domain(error),
        None => CallError::Unavailable(failure.message),
    }
}

fn transport_error(err: reqwest::Error) -> CallError {
    if err.is_decode() {
        CallError::Protocol(err.to_string())
    } else {
        CallError::Unavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = RpcClient::new("http://127.0.0.1:50051/backend", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.endpoint("Ping").unwrap().as_str(),
            "http://127.0.0.1:50051/backend/rpc/Ping"
        );

        let client = RpcClient::new("http://127.0.0.1:50051", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.endpoint("GetItem").unwrap().as_str(),
            "http://127.0.0.1:50051/rpc/GetItem"
        );
    }

    #[test]
    fn test_failures_map_to_call_errors() {
        let domain = failure_error(RpcFailure {
            result: false,
            message: "item 3 not found".into(),
            error: Some(DomainError::NotFound(3)),
        });
        assert!(matches!(domain, CallError::Domain(DomainError::NotFound(3))));

        let store = failure_error(RpcFailure {
            result: false,
            message: "store unavailable".into(),
            error: None,
        });
        assert!(matches!(store, CallError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RpcClient::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        assert!(matches!(client.ping().await, Err(CallError::Unavailable(_))));
    }
}
