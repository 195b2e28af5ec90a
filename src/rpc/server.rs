//! Backend RPC endpoint.
//!
//! # Responsibilities
//! - Expose the item service as `POST /rpc/{AddItem,GetItem,UpdateItem,DeleteItem}`
//!   and `GET /rpc/Ping`
//! - Stream name lookups as newline-delimited JSON
//! - Map service errors to status codes and `RpcFailure` bodies
//!
//! # Design Decisions
//! - The name stream is endless; it is pulled by the response body, so a
//!   client that stops reading or disconnects stops the store queries
//! - Open streams are cut when shutdown starts, so graceful shutdown
//!   cannot hang on them

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tower_http::trace::TraceLayer;

use crate::backend::{ItemService, MatchedItem, ServiceError};
use crate::http::response::domain_status;
use crate::items::{DomainError, Item};
use crate::rpc::messages::{
    AddItemResponse, DeleteItemRequest, DeleteItemResponse, GetItemResponse, ItemQuery,
    PingResponse, RpcFailure, StreamFrame, UpdateItemRequest, UpdateItemResponse, NDJSON,
};

#[derive(Clone)]
struct RpcState {
    service: Arc<ItemService>,
    closing: watch::Receiver<bool>,
}

/// Service error rendered as an RPC failure.
struct RpcError(ServiceError);

impl From<ServiceError> for RpcError {
    fn from(err: ServiceError) -> Self {
        RpcError(err)
    }
}

impl From<DomainError> for RpcError {
    fn from(err: DomainError) -> Self {
        RpcError(ServiceError::Domain(err))
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let (status, body) = failure(self.0);
        (status, Json(body)).into_response()
    }
}

fn failure(err: ServiceError) -> (StatusCode, RpcFailure) {
    let message = err.to_string();
    match err {
        ServiceError::Domain(error) => (
            domain_status(&error),
            RpcFailure {
                result: false,
                message,
                error: Some(error),
            },
        ),
        ServiceError::Store(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            RpcFailure {
                result: false,
                message,
                error: None,
            },
        ),
    }
}

pub struct RpcServer {
    service: Arc<ItemService>,
}

impl RpcServer {
    pub fn new(service: Arc<ItemService>) -> Self {
        Self { service }
    }

    /// Serve until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "RPC server starting");

        let (closing_tx, closing) = watch::channel(false);
        let app = router(self.service, closing);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("RPC server received shutdown signal, closing streams");
                let _ = closing_tx.send(true);
            })
            .await?;

        tracing::info!("RPC server stopped");
        Ok(())
    }
}

fn router(service: Arc<ItemService>, closing: watch::Receiver<bool>) -> Router {
    Router::new()
        .route("/rpc/AddItem", post(add_item))
        .route("/rpc/GetItem", post(get_item))
        .route("/rpc/UpdateItem", post(update_item))
        .route("/rpc/DeleteItem", post(delete_item))
        .route("/rpc/Ping", get(ping))
        .with_state(RpcState { service, closing })
        .layer(TraceLayer::new_for_http())
}

async fn add_item(
    State(state): State<RpcState>,
    Json(item): Json<Item>,
) -> Result<Json<AddItemResponse>, RpcError> {
    let item = state.service.add_item(item).await?;
    Ok(Json(AddItemResponse { result: true, item }))
}

async fn get_item(
    State(state): State<RpcState>,
    Json(query): Json<ItemQuery>,
) -> Result<Response, RpcError> {
    match (query.id, query.name) {
        (Some(id), _) => {
            let requested_item = state.service.get_item(id).await?;
            Ok(Json(GetItemResponse {
                result: true,
                requested_item,
                lap: None,
            })
            .into_response())
        }
        (None, Some(name)) => stream_matches(state, name).await,
        (None, None) => {
            Err(DomainError::InvalidRequest("either id or name is required".into()).into())
        }
    }
}

async fn stream_matches(state: RpcState, name: String) -> Result<Response, RpcError> {
    let mut matches = state.service.search(&name)?;

    // Pull the first element here so "no match" is a plain 404, not a stream.
    let first = match matches.next().await {
        Some(Ok(first)) => first,
        Some(Err(e)) => return Err(e.into()),
        None => return Err(DomainError::NoMatch(name).into()),
    };

    let mut closing = state.closing;
    let stopped = async move {
        let _ = closing.wait_for(|closing| *closing).await;
    };

    let lines = stream::once(async move { Ok(first) })
        .chain(matches)
        .take_until(stopped)
        .map(|element| Ok::<_, Infallible>(encode_frame(element)));

    Ok((
        [(header::CONTENT_TYPE, NDJSON)],
        Body::from_stream(lines),
    )
        .into_response())
}

fn encode_frame(element: Result<MatchedItem, ServiceError>) -> Vec<u8> {
    let frame = match element {
        Ok(matched) => StreamFrame::Item(GetItemResponse {
            result: true,
            requested_item: matched.item,
            lap: Some(matched.lap),
        }),
        Err(e) => StreamFrame::Failure(failure(e).1),
    };
    match serde_json::to_vec(&frame) {
        Ok(mut line) => {
            line.push(b'\n');
            line
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode stream frame");
            Vec::new()
        }
    }
}

async fn update_item(
    State(state): State<RpcState>,
    Json(request): Json<UpdateItemRequest>,
) -> Result<Json<UpdateItemResponse>, RpcError> {
    let change = state
        .service
        .update_item(request.id, &request.name)
        .await?;
    Ok(Json(UpdateItemResponse {
        result: true,
        old_item: change.old_item,
        new_item: change.new_item,
    }))
}

async fn delete_item(
    State(state): State<RpcState>,
    Json(request): Json<DeleteItemRequest>,
) -> Result<Json<DeleteItemResponse>, RpcError> {
    let deleted_item = state.service.delete_item(request.id).await?;
    Ok(Json(DeleteItemResponse {
        result: true,
        deleted_item,
    }))
}

/// The backend is up if it answers at all; the store's state rides along.
async fn ping(State(state): State<RpcState>) -> Json<PingResponse> {
    let store = match state.service.ping_store().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Store ping failed");
            false
        }
    };
    Json(PingResponse {
        result: true,
        store,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use axum::body::to_bytes;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<MemoryStore>, watch::Sender<bool>) {
        let store = Arc::new(MemoryStore::default());
        let service = Arc::new(ItemService::new(store.clone(), Duration::from_secs(1)));
        let (closing_tx, closing) = watch::channel(false);
        (router(service, closing), store, closing_tx)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_add_then_duplicate() {
        let (app, _store, _closing) = app();

        let ok = app
            .clone()
            .oneshot(post_json("/rpc/AddItem", serde_json::json!({"id": 1, "name": "a"})))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let dup = app
            .oneshot(post_json("/rpc/AddItem", serde_json::json!({"id": 1, "name": "b"})))
            .await
            .unwrap();
        assert_eq!(dup.status(), StatusCode::CONFLICT);
        let body = json_body(dup).await;
        assert_eq!(body["result"], false);
        assert_eq!(body["error"]["kind"], "duplicate_id");
    }

    #[tokio::test]
    async fn test_get_without_id_or_name_is_invalid() {
        let (app, _store, _closing) = app();
        let response = app
            .oneshot(post_json("/rpc/GetItem", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_name_stream_ends_on_closing() {
        let (app, _store, closing) = app();
        app.clone()
            .oneshot(post_json("/rpc/AddItem", serde_json::json!({"id": 1, "name": "cup"})))
            .await
            .unwrap();

        let response = app
            .oneshot(post_json("/rpc/GetItem", serde_json::json!({"name": "CUP"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], NDJSON);

        closing.send(true).unwrap();
        // Without the closing signal this body would never end.
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        for line in bytes.split(|b| *b == b'\n').filter(|l| !l.is_empty()) {
            let frame: GetItemResponse = serde_json::from_slice(line).unwrap();
            assert_eq!(frame.requested_item.id, 1);
        }
    }

    #[tokio::test]
    async fn test_unknown_name_is_not_found() {
        let (app, _store, _closing) = app();
        let response = app
            .oneshot(post_json("/rpc/GetItem", serde_json::json!({"name": "ghost"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["error"]["kind"], "no_match");
    }

    #[tokio::test]
    async fn test_ping_reports_store_outage() {
        let (app, store, _closing) = app();
        store.set_available(false);

        let response = app
            .oneshot(Request::get("/rpc/Ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["store"], false);
    }
}
