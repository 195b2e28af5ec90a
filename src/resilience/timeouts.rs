//! Timeout enforcement.
//!
//! Every external call (RPC attempt, store call, health probe) goes through
//! [`with_timeout`]; an elapsed deadline is reported as a distinct error so
//! callers can classify it as transient.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// The deadline elapsed before the call completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deadline of {0:?} elapsed")]
pub struct TimedOut(pub Duration);

/// Run `fut` with a deadline. The future is dropped (cancelled) on expiry.
pub async fn with_timeout<F>(deadline: Duration, fut: F) -> Result<F::Output, TimedOut>
where
    F: Future,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| TimedOut(deadline))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let slow = tokio::time::sleep(Duration::from_secs(10));
        let err = with_timeout(Duration::from_millis(50), slow).await.unwrap_err();
        assert_eq!(err, TimedOut(Duration::from_millis(50)));

        let fast = async { 7 };
        assert_eq!(with_timeout(Duration::from_millis(50), fast).await, Ok(7));
    }
}
