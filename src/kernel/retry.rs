// Copyright (c) 2025 - Cowboy AI, LLC.

//! Retry backoff shared by handler invocation (section 4.4.4 step 7c) and
//! the kernel's own state-commit step (section 7).

use rand::Rng;
use std::time::Duration;

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// `min(2^attempt * base, 60s)` plus 0-20% jitter. `attempt` is 1-indexed
/// (the first retry uses `attempt = 1`).
pub fn backoff(attempt: u32, base: Duration) -> Duration {
    let exp = 2u64.saturating_pow(attempt);
    let bounded = base
        .saturating_mul(exp as u32)
        .min(MAX_BACKOFF);
    let jitter_fraction: f64 = rand::thread_rng().gen_range(0.0..0.2);
    bounded.mul_f64(1.0 + jitter_fraction)
}

/// Retry policy for retryable handler errors (section 4.4.5).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_bounded_by_sixty_seconds() {
        let base = Duration::from_secs(1);
        for attempt in 1..10 {
            assert!(backoff(attempt, base) <= MAX_BACKOFF.mul_f64(1.2));
        }
    }

    #[test]
    fn backoff_grows_with_attempt_before_hitting_the_cap() {
        let base = Duration::from_millis(10);
        let first = backoff(1, base);
        let second = backoff(2, base);
        // jitter makes exact comparison flaky; compare lower bounds instead.
        assert!(first.as_millis() >= 20);
        assert!(second.as_millis() >= 40);
    }
}
