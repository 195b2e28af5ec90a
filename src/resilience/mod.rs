//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway call to backend:
//!     → circuit_breaker.rs (fail fast while open, one trial while half-open)
//!     → retries.rs (up to max_attempts, backoff between transient failures)
//!     → timeouts.rs (deadline on every single attempt)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - The breaker wraps the retry loop, so one logical call records one outcome
//! - Only transient failures are retried or counted; domain errors pass through

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerError, CallPermit, CircuitBreaker, CircuitOpen, CircuitSnapshot, CircuitState};
pub use retries::{RetryPolicy, Transient};
pub use timeouts::{with_timeout, TimedOut};
