//! Response mapping.
//!
//! # Responsibilities
//! - Map gateway errors to HTTP status codes with a `{"detail": ...}` body
//! - Attach `Retry-After` when the client should come back later
//! - Render write outcomes and queued acceptance distinctly
//!
//! # Design Decisions
//! - Domain refusals keep their own status (400/404/409)
//! - Backend failures after retries are 502; timeouts are 504
//! - Breaker open, dependency down and queue overflow are all 503

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::gateway::{CallError, GatewayError, Submission};
use crate::items::{DomainError, OperationOutcome};

/// Status code for a domain refusal. Shared with the backend RPC surface.
pub fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        DomainError::NotFound(_) | DomainError::NoMatch(_) => StatusCode::NOT_FOUND,
        DomainError::DuplicateId(_) | DomainError::DuplicateName(_) => StatusCode::CONFLICT,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, retry_after) = match &self {
            GatewayError::Domain(e) => (domain_status(e), None),
            GatewayError::Backend(CallError::Timeout(_)) => (StatusCode::GATEWAY_TIMEOUT, None),
            GatewayError::Backend(_) => (StatusCode::BAD_GATEWAY, None),
            GatewayError::CircuitOpen { retry_after_secs }
            | GatewayError::DependencyDown {
                retry_after_secs, ..
            }
            | GatewayError::QueueOverflow {
                retry_after_secs, ..
            } => (StatusCode::SERVICE_UNAVAILABLE, Some(*retry_after_secs)),
        };

        if status.is_server_error() {
            tracing::warn!(status = %status, error = %self, "Request failed");
        }

        let mut response = (status, Json(json!({ "detail": self.to_string() }))).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// 201 for a completed add, 200 for other completed writes, 202 + ticket
/// for queued ones.
pub fn submission_response(submission: Submission) -> Response {
    match submission {
        Submission::Completed(outcome) => outcome_response(outcome),
        Submission::Queued(ticket) => queued_response(ticket),
    }
}

fn outcome_response(outcome: OperationOutcome) -> Response {
    match outcome {
        OperationOutcome::Added { item } => (
            StatusCode::CREATED,
            Json(json!({ "message": "Item added successfully", "item": item })),
        )
            .into_response(),
        OperationOutcome::Updated { old_item, new_item } => (
            StatusCode::OK,
            Json(json!({
                "message": "Item updated successfully",
                "old_item": old_item,
                "new_item": new_item,
            })),
        )
            .into_response(),
        OperationOutcome::Deleted { item } => (
            StatusCode::OK,
            Json(json!({ "message": "Item deleted successfully", "deleted_item": item })),
        )
            .into_response(),
    }
}

fn queued_response(ticket: Uuid) -> Response {
    let location = format!("/requests/{ticket}");
    let mut response = (
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Request queued; the backend is unavailable",
            "ticket": ticket,
            "status_url": location,
        })),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::Dependency;
    use crate::items::Item;
    use std::time::Duration;

    #[test]
    fn test_error_statuses() {
        let cases = [
            (GatewayError::Domain(DomainError::InvalidRequest("x".into())), 400),
            (GatewayError::Domain(DomainError::NotFound(1)), 404),
            (GatewayError::Domain(DomainError::DuplicateName("a".into())), 409),
            (GatewayError::Backend(CallError::Unavailable("down".into())), 502),
            (GatewayError::Backend(CallError::Timeout(Duration::from_secs(2))), 504),
        ];
        for (err, status) in cases {
            let response = err.into_response();
            assert_eq!(response.status().as_u16(), status);
            assert!(response.headers().get(header::RETRY_AFTER).is_none());
        }
    }

    #[test]
    fn test_unavailable_errors_carry_retry_after() {
        let response = GatewayError::DependencyDown {
            dependency: Dependency::Store,
            retry_after_secs: 5,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "5");

        let response = GatewayError::CircuitOpen { retry_after_secs: 6 }.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "6");
    }

    #[test]
    fn test_submission_statuses() {
        let added = Submission::Completed(OperationOutcome::Added {
            item: Item::new(1, "a"),
        });
        assert_eq!(submission_response(added).status(), StatusCode::CREATED);

        let queued = submission_response(Submission::Queued(Uuid::new_v4()));
        assert_eq!(queued.status(), StatusCode::ACCEPTED);
        assert!(queued.headers().contains_key(header::LOCATION));
    }
}
