//! Replays queued writes once the backend is reachable again.

use std::sync::Arc;
use tokio::sync::{broadcast, Notify};

use crate::config::FailurePolicy;
use crate::gateway::{Gateway, GatewayError};
use crate::health::Availability;
use crate::queue::request_queue::{DeadLetterReason, RequestQueue, TicketStatus};

/// What one drain pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: usize,
    pub rejected: usize,
    pub dead_lettered: usize,
    /// The pass stopped with entries still waiting.
    pub interrupted: bool,
}

pub struct QueueDrainer {
    gateway: Arc<Gateway>,
    queue: Arc<RequestQueue>,
    availability: Availability,
    drain: Arc<Notify>,
}

impl QueueDrainer {
    pub fn new(gateway: Arc<Gateway>, availability: Availability, drain: Arc<Notify>) -> Self {
        let queue = gateway.queue().clone();
        Self {
            gateway,
            queue,
            availability,
            drain,
        }
    }

    /// Drain on every signal until shutdown. A pass in progress finishes
    /// before shutdown is observed.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!("Queue drainer starting");
        loop {
            tokio::select! {
                _ = self.drain.notified() => {
                    if self.queue.is_empty() {
                        continue;
                    }
                    let report = self.drain_once().await;
                    tracing::info!(
                        completed = report.completed,
                        rejected = report.rejected,
                        dead_lettered = report.dead_lettered,
                        remaining = self.queue.len(),
                        "Queue drain pass finished"
                    );
                }
                _ = shutdown.recv() => {
                    tracing::info!(remaining = self.queue.len(), "Queue drainer received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Replay entries in order while every dependency is available.
    pub async fn drain_once(&self) -> DrainReport {
        let mut report = DrainReport::default();

        loop {
            if !self.availability.all_available() {
                report.interrupted = !self.queue.is_empty();
                break;
            }
            let Some(mut request) = self.queue.pop_front() else {
                break;
            };

            match self.gateway.replay(&request.operation, request.replays).await {
                Ok(outcome) => {
                    tracing::debug!(ticket = %request.ticket, "Queued write replayed");
                    self.queue
                        .complete(request.ticket, TicketStatus::Completed { outcome });
                    report.completed += 1;
                }
                Err(GatewayError::Domain(error)) => {
                    tracing::info!(ticket = %request.ticket, error = %error, "Queued write rejected by backend");
                    self.queue
                        .complete(request.ticket, TicketStatus::Rejected { error });
                    report.rejected += 1;
                }
                Err(GatewayError::CircuitOpen { .. }) | Err(GatewayError::DependencyDown { .. }) => {
                    // Not attempted; does not use up a replay.
                    self.queue.requeue(request);
                    report.interrupted = true;
                    break;
                }
                Err(e) => {
                    request.replays += 1;
                    let config = self.queue.config();
                    let give_up = config.on_failure == FailurePolicy::DeadLetter
                        || request.replays >= config.max_replays;

                    tracing::warn!(
                        ticket = %request.ticket,
                        replays = request.replays,
                        error = %e,
                        give_up,
                        "Queued write replay failed"
                    );
                    if give_up {
                        self.queue.give_up(request, DeadLetterReason::ReplayFailed);
                        report.dead_lettered += 1;
                    } else {
                        self.queue.requeue(request);
                    }
                    report.interrupted = !self.queue.is_empty();
                    break;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{QueueConfig, ServiceConfig};
    use crate::gateway::testing::FakeBackend;
    use crate::gateway::Submission;
    use crate::health::{state, Dependency};
    use crate::items::{DomainError, Item, ItemOperation};
    use crate::queue::DeadLetter;
    use tokio::sync::mpsc;

    struct Fixture {
        backend: Arc<FakeBackend>,
        gateway: Arc<Gateway>,
        publisher: state::AvailabilityPublisher,
        drainer: QueueDrainer,
        dead: mpsc::UnboundedReceiver<DeadLetter>,
    }

    fn fixture(queue_config: QueueConfig) -> Fixture {
        let mut config = ServiceConfig::default();
        config.retries.jitter_ratio = 0.0;
        config.circuit_breaker.failure_threshold = 10;

        let backend = Arc::new(FakeBackend::default());
        let (publisher, availability) = state::channel();
        let (queue, dead) = RequestQueue::new(queue_config);
        let gateway = Arc::new(Gateway::new(
            backend.clone(),
            &config,
            Arc::new(queue),
            availability.clone(),
        ));
        let drainer = QueueDrainer::new(gateway.clone(), availability, Arc::new(Notify::new()));
        Fixture {
            backend,
            gateway,
            publisher,
            drainer,
            dead,
        }
    }

    fn add(id: i64, name: &str) -> ItemOperation {
        ItemOperation::Add {
            item: Item::new(id, name),
        }
    }

    async fn queued(gateway: &Gateway, op: ItemOperation) -> uuid::Uuid {
        match gateway.submit(op).await.unwrap() {
            Submission::Queued(ticket) => ticket,
            other => panic!("expected queued, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_replays_in_order_with_final_outcomes() {
        let f = fixture(QueueConfig::default());
        f.publisher.set(Dependency::Backend, false);

        let first = queued(&f.gateway, add(1, "a")).await;
        let duplicate = queued(&f.gateway, add(1, "b")).await;
        let third = queued(&f.gateway, add(2, "c")).await;

        // Nothing moves while the backend is down.
        let report = f.drainer.drain_once().await;
        assert!(report.interrupted);
        assert_eq!(f.backend.calls(), 0);

        f.publisher.set(Dependency::Backend, true);
        let report = f.drainer.drain_once().await;
        assert_eq!(report.completed, 2);
        assert_eq!(report.rejected, 1);
        assert!(f.gateway.queue().is_idle());

        assert!(matches!(f.gateway.ticket_status(&first), Some(TicketStatus::Completed { .. })));
        assert_eq!(
            f.gateway.ticket_status(&duplicate),
            Some(TicketStatus::Rejected {
                error: DomainError::DuplicateId(1)
            })
        );
        assert!(matches!(f.gateway.ticket_status(&third), Some(TicketStatus::Completed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_replay_is_requeued_then_dead_lettered() {
        let mut f = fixture(QueueConfig {
            max_replays: 2,
            ..QueueConfig::default()
        });
        f.publisher.set(Dependency::Store, false);
        let ticket = queued(&f.gateway, add(1, "a")).await;
        f.publisher.set(Dependency::Store, true);

        // Each pass exhausts three attempts.
        f.backend.fail_next(6);
        let report = f.drainer.drain_once().await;
        assert_eq!(report.dead_lettered, 0);
        assert_eq!(f.gateway.queue().len(), 1);

        let report = f.drainer.drain_once().await;
        assert_eq!(report.dead_lettered, 1);
        assert!(f.gateway.queue().is_idle());

        let letter = f.dead.try_recv().unwrap();
        assert_eq!(letter.ticket, ticket);
        assert_eq!(letter.reason, DeadLetterReason::ReplayFailed);
        assert_eq!(letter.replays, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_letter_policy_gives_up_immediately() {
        let mut f = fixture(QueueConfig {
            on_failure: FailurePolicy::DeadLetter,
            ..QueueConfig::default()
        });
        f.publisher.set(Dependency::Backend, false);
        queued(&f.gateway, add(1, "a")).await;
        queued(&f.gateway, add(2, "b")).await;
        f.publisher.set(Dependency::Backend, true);

        f.backend.fail_next(3);
        let report = f.drainer.drain_once().await;
        assert_eq!(report.dead_lettered, 1);
        assert!(report.interrupted);
        assert_eq!(f.dead.try_recv().unwrap().operation.item_id(), 1);

        let report = f.drainer.drain_once().await;
        assert_eq!(report.completed, 1);
    }
}
