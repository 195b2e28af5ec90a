//! Item resource handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::gateway::{Gateway, GatewayError};
use crate::http::response::submission_response;
use crate::items::{DomainError, Item, ItemId, ItemOperation};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

#[derive(Debug, Deserialize)]
pub struct ItemsQuery {
    pub id: Option<ItemId>,
    /// Accepted as an alias of `id`.
    pub item_id: Option<ItemId>,
    pub name: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RenamePayload {
    pub name: String,
}

pub async fn create_item(
    State(state): State<AppState>,
    Json(item): Json<Item>,
) -> Result<Response, GatewayError> {
    let submission = state.gateway.submit(ItemOperation::Add { item }).await?;
    Ok(submission_response(submission))
}

pub async fn find_items(
    State(state): State<AppState>,
    Query(query): Query<ItemsQuery>,
) -> Result<Response, GatewayError> {
    if let Some(id) = query.id.or(query.item_id) {
        let item = state.gateway.get_item(id).await?;
        return Ok(Json(json!({ "message": "Item found", "items": [item] })).into_response());
    }

    match query.name {
        Some(name) => {
            let items = state.gateway.find_by_name(&name, query.limit).await?;
            Ok(Json(json!({ "message": "Items found", "items": items })).into_response())
        }
        None => Err(DomainError::InvalidRequest("either id or name is required".into()).into()),
    }
}

pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<ItemId>,
) -> Result<Response, GatewayError> {
    let item = state.gateway.get_item(id).await?;
    Ok(Json(json!({ "message": "Item found", "item": item })).into_response())
}

pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<ItemId>,
    Json(payload): Json<RenamePayload>,
) -> Result<Response, GatewayError> {
    let operation = ItemOperation::Update {
        id,
        name: payload.name,
    };
    let submission = state.gateway.submit(operation).await?;
    Ok(submission_response(submission))
}

pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<ItemId>,
) -> Result<Response, GatewayError> {
    let submission = state.gateway.submit(ItemOperation::Delete { id }).await?;
    Ok(submission_response(submission))
}

pub async fn ticket_status(State(state): State<AppState>, Path(ticket): Path<Uuid>) -> Response {
    match state.gateway.ticket_status(&ticket) {
        Some(status) => Json(json!({ "ticket": ticket, "request": status })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": format!("unknown ticket {ticket}") })),
        )
            .into_response(),
    }
}

pub async fn status(State(state): State<AppState>) -> Response {
    Json(state.gateway.status().await).into_response()
}

pub async fn health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{QueueConfig, ServiceConfig};
    use crate::gateway::testing::FakeBackend;
    use crate::health::{state as availability, Dependency};
    use crate::http::server::build_router;
    use crate::queue::RequestQueue;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use axum::Router;
    use tower::ServiceExt;

    fn app(backend: Arc<FakeBackend>) -> (Router, availability::AvailabilityPublisher) {
        let config = ServiceConfig::default();
        let (publisher, flags) = availability::channel();
        let (queue, _dead) = RequestQueue::new(QueueConfig::default());
        let gateway = Arc::new(Gateway::new(backend, &config, Arc::new(queue), flags));
        (build_router(&config, AppState { gateway }), publisher)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_crud_round() {
        let backend = Arc::new(FakeBackend::default());
        let (app, _flags) = app(backend);

        let created = app
            .clone()
            .oneshot(json_request("POST", "/items", json!({"id": 301, "name": "Test Item"})))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        assert!(created.headers().contains_key("x-request-id"));

        let duplicate = app
            .clone()
            .oneshot(json_request("POST", "/items", json!({"id": 302, "name": "Test Item"})))
            .await
            .unwrap();
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);
        assert!(body_json(duplicate).await["detail"].is_string());

        let found = app.clone().oneshot(get("/items?item_id=301")).await.unwrap();
        assert_eq!(found.status(), StatusCode::OK);
        assert_eq!(body_json(found).await["items"][0]["name"], "Test Item");

        let renamed = app
            .clone()
            .oneshot(json_request("PUT", "/items/301", json!({"name": "Renamed"})))
            .await
            .unwrap();
        assert_eq!(renamed.status(), StatusCode::OK);
        assert_eq!(body_json(renamed).await["old_item"]["name"], "Test Item");

        let deleted = app
            .clone()
            .oneshot(Request::delete("/items/301").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::OK);

        let missing = app.oneshot(get("/items/301")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_find_by_name_returns_one_lap_or_limit() {
        let backend = Arc::new(FakeBackend::default());
        backend.put(Item::new(1, "red cup"));
        backend.put(Item::new(2, "Blue Cup"));
        let (app, _flags) = app(backend);

        let lap = body_json(app.clone().oneshot(get("/items?name=cup")).await.unwrap()).await;
        assert_eq!(lap["items"].as_array().unwrap().len(), 2);

        let limited = body_json(app.clone().oneshot(get("/items?name=cup&limit=5")).await.unwrap()).await;
        let ids: Vec<i64> = limited["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 1, 2, 1]);

        let neither = app.oneshot(get("/items")).await.unwrap();
        assert_eq!(neither.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_queued_write_and_ticket() {
        let backend = Arc::new(FakeBackend::default());
        let (app, flags) = app(backend.clone());
        flags.set(Dependency::Backend, false);

        let queued = app
            .clone()
            .oneshot(json_request("POST", "/items", json!({"id": 1, "name": "a"})))
            .await
            .unwrap();
        assert_eq!(queued.status(), StatusCode::ACCEPTED);
        let ticket = body_json(queued).await["ticket"].as_str().unwrap().to_string();
        assert_eq!(backend.calls(), 0);

        let status = app
            .clone()
            .oneshot(get(&format!("/requests/{ticket}")))
            .await
            .unwrap();
        assert_eq!(body_json(status).await["request"]["status"], "pending");

        let read = app.clone().oneshot(get("/items/1")).await.unwrap();
        assert_eq!(read.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(read.headers().contains_key(header::RETRY_AFTER));

        let overview = body_json(app.oneshot(get("/status")).await.unwrap()).await;
        assert_eq!(overview["queue_depth"], 1);
        assert_eq!(overview["backend_available"], false);
        assert_eq!(overview["circuit"]["state"], "closed");
    }
}
