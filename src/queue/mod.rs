//! Request queue subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway::submit (write cannot be delivered now)
//!     → request_queue.rs (bounded FIFO, ticket per entry)
//!     → drain signal from the health prober
//!     → drainer.rs (replay in order through breaker + retry)
//!     → final ticket status, or requeue at the head, or dead letter
//! ```
//!
//! # Design Decisions
//! - The lock is held for a single push or pop, never across an await
//! - Draining and enqueuing never wait on each other
//! - Dead letters leave through an mpsc channel; the gateway logs them

pub mod drainer;
pub mod request_queue;

pub use drainer::{DrainReport, QueueDrainer};
pub use request_queue::{
    DeadLetter, DeadLetterReason, QueueError, QueuedRequest, RequestQueue, TicketStatus,
};

use tokio::sync::mpsc;

/// Log every dead letter until the queue is dropped.
pub async fn log_dead_letters(mut dead_letters: mpsc::UnboundedReceiver<DeadLetter>) {
    while let Some(letter) = dead_letters.recv().await {
        tracing::error!(
            ticket = %letter.ticket,
            operation = letter.operation.kind(),
            item_id = letter.operation.item_id(),
            reason = letter.reason.as_str(),
            replays = letter.replays,
            "Request dead-lettered"
        );
    }
}
