//! Retry policy.
//!
//! # Responsibilities
//! - Run one logical call as up to `max_attempts` attempts
//! - Sleep on the backoff schedule between attempts
//! - Retry transient failures only; anything else returns immediately
//!
//! The caller (the circuit breaker) sees a single outcome however many
//! attempts were made.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

/// Classifies an error as worth another attempt.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Bounded, delayed retries for a single logical call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Total attempts a call may take.
    pub fn max_attempts(&self) -> u32 {
        if self.config.enabled {
            self.config.max_attempts.max(1)
        } else {
            1
        }
    }

    /// Delay before the attempt following failed attempt `attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        calculate_backoff(
            self.config.backoff,
            attempt,
            self.config.base_delay_ms,
            self.config.max_delay_ms,
            self.config.jitter_ratio,
        )
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, E, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + fmt::Display,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation, attempt, "Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    tracing::warn!(operation, attempts = attempt, error = %e, "Retries exhausted");
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(operation, attempt, delay = ?delay, error = %e, "Attempt failed, retrying");
                    metrics::record_retry(operation);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
