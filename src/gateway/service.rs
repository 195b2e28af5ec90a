//! Request composition: queue, breaker, retry, backend call.
//!
//! # Data Flow
//! ```text
//! write ─┬─ dependency down / queue busy ──────────────→ RequestQueue (202)
//!        └─ breaker ─ retry ─ backend ─┬─ outcome ─────→ caller (200/201)
//!                                      └─ circuit open → RequestQueue (202)
//! read ──┬─ dependency down ───────────────────────────→ 503 + Retry-After
//!        └─ breaker ─ retry ─ backend ────────────────→ caller
//! ```

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::gateway::backend::{CallError, ItemBackend};
use crate::health::{Availability, Dependency};
use crate::items::types::validate_id;
use crate::items::{DomainError, Item, ItemId, ItemOperation, OperationOutcome};
use crate::observability::metrics;
use crate::queue::{QueueError, RequestQueue, TicketStatus};
use crate::resilience::{BreakerError, CircuitBreaker, CircuitSnapshot, RetryPolicy};

/// Errors surfaced to gateway clients.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The backend kept failing through every retry.
    #[error("backend call failed: {0}")]
    Backend(CallError),

    #[error("circuit breaker is open")]
    CircuitOpen { retry_after_secs: u64 },

    #[error("{} is unavailable", .dependency.as_str())]
    DependencyDown {
        dependency: Dependency,
        retry_after_secs: u64,
    },

    #[error("request queue is full ({depth} entries)")]
    QueueOverflow { depth: usize, retry_after_secs: u64 },
}

impl From<CallError> for GatewayError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Domain(e) => GatewayError::Domain(e),
            other => GatewayError::Backend(other),
        }
    }
}

impl GatewayError {
    fn metric_label(&self) -> &'static str {
        match self {
            GatewayError::Domain(_) => "rejected",
            GatewayError::Backend(CallError::Timeout(_)) => "timeout",
            GatewayError::Backend(_) => "backend_error",
            GatewayError::CircuitOpen { .. } => "circuit_open",
            GatewayError::DependencyDown { .. } => "dependency_down",
            GatewayError::QueueOverflow { .. } => "queue_overflow",
        }
    }
}

/// How a write was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Completed(OperationOutcome),
    /// Deferred; poll the ticket for the outcome.
    Queued(Uuid),
}

/// Snapshot served by `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    pub circuit: Option<CircuitSnapshot>,
    pub backend_available: bool,
    pub store_available: bool,
    pub queue_depth: usize,
}

pub struct Gateway {
    backend: Arc<dyn ItemBackend>,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    queue: Arc<RequestQueue>,
    availability: Availability,
    find_max_limit: usize,
    circuit_retry_after_secs: u64,
    dependency_retry_after_secs: u64,
}

impl Gateway {
    /// Build the gateway and spawn its circuit breaker. Must be called from
    /// within a Tokio runtime.
    pub fn new(
        backend: Arc<dyn ItemBackend>,
        config: &ServiceConfig,
        queue: Arc<RequestQueue>,
        availability: Availability,
    ) -> Self {
        let breaker = CircuitBreaker::spawn(
            &config.circuit_breaker,
            Some(availability.subscribe(Dependency::Backend)),
        );

        Self {
            backend,
            breaker,
            retry: RetryPolicy::new(config.retries.clone()),
            queue,
            availability,
            find_max_limit: config.gateway.find_max_limit,
            circuit_retry_after_secs: config.circuit_breaker.reset_timeout_secs.max(1),
            dependency_retry_after_secs: config.health_check.interval_secs.max(1),
        }
    }

    /// Apply a write now, or queue it when it cannot be delivered yet.
    pub async fn submit(&self, operation: ItemOperation) -> Result<Submission, GatewayError> {
        operation.validate()?;

        if let Some(dependency) = self.availability.first_unavailable() {
            tracing::info!(
                operation = operation.kind(),
                dependency = dependency.as_str(),
                "Dependency down, queuing write"
            );
            return self.enqueue(operation);
        }

        // Earlier writes still waiting must land first.
        if !self.queue.is_idle() {
            return self.enqueue(operation);
        }

        match self.execute(&operation).await {
            Ok(outcome) => Ok(Submission::Completed(outcome)),
            Err(GatewayError::CircuitOpen { .. }) => {
                tracing::info!(operation = operation.kind(), "Circuit open, queuing write");
                self.enqueue(operation)
            }
            Err(e) => Err(e),
        }
    }

    /// Deliver a write through the breaker and retry policy.
    pub async fn execute(&self, operation: &ItemOperation) -> Result<OperationOutcome, GatewayError> {
        self.deliver(operation, false).await
    }

    /// Deliver a queued write. `replays` counts earlier deliveries that
    /// failed transiently and so may have landed anyway.
    pub async fn replay(
        &self,
        operation: &ItemOperation,
        replays: u32,
    ) -> Result<OperationOutcome, GatewayError> {
        self.deliver(operation, replays > 0).await
    }

    async fn deliver(
        &self,
        operation: &ItemOperation,
        resumed: bool,
    ) -> Result<OperationOutcome, GatewayError> {
        let backend = self.backend.as_ref();
        let mut attempts = 0u32;
        self.call(operation.kind(), move || {
            attempts += 1;
            let retried = resumed || attempts > 1;
            async move {
                match dispatch(backend, operation).await {
                    Err(CallError::Domain(DomainError::DuplicateId(id))) if retried => {
                        confirm_add(backend, operation, id).await
                    }
                    other => other,
                }
            }
        })
        .await
    }

    pub async fn get_item(&self, id: ItemId) -> Result<Item, GatewayError> {
        validate_id(id)?;
        self.ensure_available()?;
        let backend = self.backend.as_ref();
        self.call("get", move || backend.get_item(id)).await
    }

    /// Name lookup. `limit` of `None` returns one full lap of matches.
    pub async fn find_by_name(&self, name: &str, limit: Option<usize>) -> Result<Vec<Item>, GatewayError> {
        if name.trim().is_empty() {
            return Err(DomainError::InvalidRequest("name must not be empty".into()).into());
        }
        let limit = match limit {
            Some(0) => {
                return Err(DomainError::InvalidRequest("limit must be at least 1".into()).into())
            }
            Some(n) => Some(n.min(self.find_max_limit)),
            None => None,
        };
        self.ensure_available()?;

        let backend = self.backend.as_ref();
        self.call("find", move || backend.find_by_name(name, limit))
            .await
    }

    pub fn ticket_status(&self, ticket: &Uuid) -> Option<TicketStatus> {
        self.queue.status(ticket)
    }

    pub async fn status(&self) -> GatewayStatus {
        GatewayStatus {
            circuit: self.breaker.snapshot().await,
            backend_available: self.availability.is_available(Dependency::Backend),
            store_available: self.availability.is_available(Dependency::Store),
            queue_depth: self.queue.len(),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn queue(&self) -> &Arc<RequestQueue> {
        &self.queue
    }

    fn ensure_available(&self) -> Result<(), GatewayError> {
        match self.availability.first_unavailable() {
            Some(dependency) => Err(GatewayError::DependencyDown {
                dependency,
                retry_after_secs: self.dependency_retry_after_secs,
            }),
            None => Ok(()),
        }
    }

    fn enqueue(&self, operation: ItemOperation) -> Result<Submission, GatewayError> {
        match self.queue.enqueue(operation) {
            Ok(ticket) => Ok(Submission::Queued(ticket)),
            Err(QueueError::Overflow(depth)) => {
                tracing::warn!(depth, "Request queue full, rejecting write");
                Err(GatewayError::QueueOverflow {
                    depth,
                    retry_after_secs: self.dependency_retry_after_secs,
                })
            }
        }
    }

    /// One logical backend call: a single breaker outcome around the whole
    /// retry loop.
    async fn call<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let start = Instant::now();
        let retry = &self.retry;

        let result = match self.breaker.call(move || retry.run(operation, call)).await {
            Ok(value) => Ok(value),
            Err(BreakerError::Open) => Err(GatewayError::CircuitOpen {
                retry_after_secs: self.circuit_retry_after_secs,
            }),
            Err(BreakerError::Inner(e)) => Err(GatewayError::from(e)),
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.metric_label(),
        };
        metrics::record_request(operation, outcome, start);
        result
    }
}

async fn dispatch(
    backend: &dyn ItemBackend,
    operation: &ItemOperation,
) -> Result<OperationOutcome, CallError> {
    match operation {
        ItemOperation::Add { item } => backend
            .add_item(item)
            .await
            .map(|item| OperationOutcome::Added { item }),
        ItemOperation::Update { id, name } => backend
            .update_item(*id, name)
            .await
            .map(OperationOutcome::from),
        ItemOperation::Delete { id } => backend
            .delete_item(*id)
            .await
            .map(|item| OperationOutcome::Deleted { item }),
    }
}

/// An add that timed out may have landed before the retry saw
/// `DuplicateId`. It counts as done when the stored item is the one sent.
async fn confirm_add(
    backend: &dyn ItemBackend,
    operation: &ItemOperation,
    id: ItemId,
) -> Result<OperationOutcome, CallError> {
    let ItemOperation::Add { item } = operation else {
        return Err(DomainError::DuplicateId(id).into());
    };
    match backend.get_item(id).await {
        Ok(stored) if stored == *item => {
            tracing::info!(id, "Earlier add attempt had landed, treating duplicate as success");
            Ok(OperationOutcome::Added { item: stored })
        }
        _ => Err(DomainError::DuplicateId(id).into()),
    }
}
