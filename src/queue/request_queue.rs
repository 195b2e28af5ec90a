//! Bounded FIFO of write requests waiting for the backend.
//!
//! Entries carry a ticket so the client can poll the eventual outcome.
//! Requests that can no longer be delivered (overflowed, expired, or out of
//! replays) go to the dead-letter channel, never silently away.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::{OverflowPolicy, QueueConfig};
use crate::items::{DomainError, ItemOperation, OperationOutcome};
use crate::observability::metrics;

/// A write waiting to be replayed.
#[derive(Debug, Clone)]
pub struct QueuedRequest {
    pub ticket: Uuid,
    pub operation: ItemOperation,
    pub enqueued_at: Instant,
    /// Replays that ended in a transient failure so far.
    pub replays: u32,
}

/// Why a request was given up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// Pushed out by a newer request under `drop_oldest`.
    Overflow,
    /// Waited longer than `max_age_secs`.
    Expired,
    /// Replays kept failing.
    ReplayFailed,
}

impl DeadLetterReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DeadLetterReason::Overflow => "overflow",
            DeadLetterReason::Expired => "expired",
            DeadLetterReason::ReplayFailed => "replay_failed",
        }
    }
}

/// A request handed out of band.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub ticket: Uuid,
    pub operation: ItemOperation,
    pub reason: DeadLetterReason,
    pub replays: u32,
}

/// The observable fate of a ticket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    Completed { outcome: OperationOutcome },
    Rejected { error: DomainError },
    Failed { reason: DeadLetterReason },
}

impl TicketStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, TicketStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("request queue is full ({0} entries)")]
    Overflow(usize),
}

pub struct RequestQueue {
    entries: Mutex<VecDeque<QueuedRequest>>,
    tickets: DashMap<Uuid, TicketStatus>,
    /// Requests popped for replay whose outcome is not settled yet.
    in_flight: AtomicUsize,
    dead_letters: mpsc::UnboundedSender<DeadLetter>,
    config: QueueConfig,
}

impl RequestQueue {
    /// Create a queue and the receiving end of its dead-letter channel.
    pub fn new(config: QueueConfig) -> (Self, mpsc::UnboundedReceiver<DeadLetter>) {
        let (dead_letters, receiver) = mpsc::unbounded_channel();
        let queue = Self {
            entries: Mutex::new(VecDeque::with_capacity(config.max_size.min(1024))),
            tickets: DashMap::new(),
            in_flight: AtomicUsize::new(0),
            dead_letters,
            config,
        };
        (queue, receiver)
    }

    /// Append a request, returning its ticket.
    pub fn enqueue(&self, operation: ItemOperation) -> Result<Uuid, QueueError> {
        let ticket = Uuid::new_v4();
        let request = QueuedRequest {
            ticket,
            operation,
            enqueued_at: Instant::now(),
            replays: 0,
        };

        let (expired, evicted, depth) = {
            let mut entries = self.entries.lock();
            let expired = take_expired(&mut entries, self.config.max_age());
            let evicted = if entries.len() >= self.config.max_size {
                match self.config.overflow {
                    OverflowPolicy::RejectNew => {
                        let depth = entries.len();
                        drop(entries);
                        self.expire(expired);
                        return Err(QueueError::Overflow(depth));
                    }
                    OverflowPolicy::DropOldest => entries.pop_front(),
                }
            } else {
                None
            };
            entries.push_back(request);
            (expired, evicted, entries.len())
        };

        self.expire(expired);
        self.tickets.insert(ticket, TicketStatus::Pending);
        if let Some(oldest) = evicted {
            self.send_dead_letter(oldest, DeadLetterReason::Overflow);
        }
        metrics::record_queue_depth(depth);
        tracing::debug!(%ticket, depth, "Request queued");
        Ok(ticket)
    }

    /// Take the oldest live request for replay. Expired requests met on the
    /// way are dead-lettered. The caller must settle what it gets with
    /// [`complete`](Self::complete), [`requeue`](Self::requeue) or
    /// [`give_up`](Self::give_up).
    pub fn pop_front(&self) -> Option<QueuedRequest> {
        let (expired, next, depth) = {
            let mut entries = self.entries.lock();
            let expired = take_expired(&mut entries, self.config.max_age());
            let next = entries.pop_front();
            if next.is_some() {
                self.in_flight.fetch_add(1, Ordering::SeqCst);
            }
            (expired, next, entries.len())
        };

        self.expire(expired);
        metrics::record_queue_depth(depth);
        next
    }

    /// Dead-letter every request older than `max_age`. Returns how many went.
    pub fn expire_stale(&self) -> usize {
        let (expired, depth) = {
            let mut entries = self.entries.lock();
            let expired = take_expired(&mut entries, self.config.max_age());
            (expired, entries.len())
        };
        let count = expired.len();
        if count > 0 {
            self.expire(expired);
            metrics::record_queue_depth(depth);
        }
        count
    }

    fn expire(&self, expired: Vec<QueuedRequest>) {
        for request in expired {
            tracing::debug!(ticket = %request.ticket, "Queued request expired");
            self.send_dead_letter(request, DeadLetterReason::Expired);
        }
    }

    /// Put a popped request back at the head.
    pub fn requeue(&self, request: QueuedRequest) {
        let depth = {
            let mut entries = self.entries.lock();
            entries.push_front(request);
            entries.len()
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        metrics::record_queue_depth(depth);
    }

    /// Record the final status of a popped request.
    pub fn complete(&self, ticket: Uuid, status: TicketStatus) {
        self.tickets.insert(ticket, status);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Dead-letter a popped request.
    pub fn give_up(&self, request: QueuedRequest, reason: DeadLetterReason) {
        self.send_dead_letter(request, reason);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn send_dead_letter(&self, request: QueuedRequest, reason: DeadLetterReason) {
        self.tickets
            .insert(request.ticket, TicketStatus::Failed { reason });
        metrics::record_dead_letter(reason.as_str());
        let letter = DeadLetter {
            ticket: request.ticket,
            operation: request.operation,
            reason,
            replays: request.replays,
        };
        if self.dead_letters.send(letter).is_err() {
            tracing::error!(ticket = %request.ticket, reason = reason.as_str(), "Dead-letter channel closed");
        }
    }

    /// Status of a ticket. Final statuses are handed out once, then forgotten.
    /// Requests past their age limit read as failed even mid-outage.
    pub fn status(&self, ticket: &Uuid) -> Option<TicketStatus> {
        self.expire_stale();
        if let Some((_, status)) = self.tickets.remove_if(ticket, |_, status| status.is_final()) {
            return Some(status);
        }
        self.tickets.get(ticket).map(|entry| entry.value().clone())
    }

    /// Requests waiting, not counting one being replayed.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Nothing waiting and nothing being replayed. New writes may bypass
    /// the queue only when this holds.
    pub fn is_idle(&self) -> bool {
        self.is_empty() && self.in_flight.load(Ordering::SeqCst) == 0
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }
}

/// Remove requests older than `max_age`, wherever they sit in the queue.
fn take_expired(
    entries: &mut VecDeque<QueuedRequest>,
    max_age: Option<std::time::Duration>,
) -> Vec<QueuedRequest> {
    let Some(max_age) = max_age else {
        return Vec::new();
    };
    if !entries.iter().any(|r| r.enqueued_at.elapsed() > max_age) {
        return Vec::new();
    }
    let (expired, live): (VecDeque<_>, VecDeque<_>) = entries
        .drain(..)
        .partition(|r| r.enqueued_at.elapsed() > max_age);
    *entries = live;
    expired.into()
}
