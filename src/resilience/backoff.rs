//! Backoff schedule with jitter.

use rand::Rng;
use std::time::Duration;

use crate::config::BackoffKind;

/// Delay to wait after failed attempt number `attempt` (1-based).
///
/// Exponential: `base * 2^(attempt-1)`. Linear: `base * attempt`. The result
/// is capped at `max_ms`, then up to `jitter_ratio` of it is added.
pub fn calculate_backoff(
    kind: BackoffKind,
    attempt: u32,
    base_ms: u64,
    max_ms: u64,
    jitter_ratio: f64,
) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let delay_ms = match kind {
        BackoffKind::Exponential => base_ms.saturating_mul(2u64.saturating_pow(attempt - 1)),
        BackoffKind::Linear => base_ms.saturating_mul(attempt as u64),
    };
    let capped_delay = delay_ms.min(max_ms);

    let jitter_range = (capped_delay as f64 * jitter_ratio.clamp(0.0, 1.0)) as u64;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_schedule() {
        let b1 = calculate_backoff(BackoffKind::Exponential, 1, 1000, 8000, 0.0);
        assert_eq!(b1, Duration::from_secs(1));

        let b2 = calculate_backoff(BackoffKind::Exponential, 2, 1000, 8000, 0.0);
        assert_eq!(b2, Duration::from_secs(2));

        let max = calculate_backoff(BackoffKind::Exponential, 10, 100, 1000, 0.0);
        assert_eq!(max, Duration::from_millis(1000));
    }

    #[test]
    fn test_linear_schedule() {
        let b3 = calculate_backoff(BackoffKind::Linear, 3, 500, 8000, 0.0);
        assert_eq!(b3, Duration::from_millis(1500));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        for _ in 0..100 {
            let d = calculate_backoff(BackoffKind::Exponential, 2, 100, 2000, 0.1);
            assert!(d >= Duration::from_millis(200));
            assert!(d < Duration::from_millis(220));
        }
    }
}
