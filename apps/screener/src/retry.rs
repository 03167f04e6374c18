//! Retry with exponential backoff for any fallible async operation.
//!
//! The delay before attempt `n + 1` is `base_delay * 2^(n - 1)`: with a 500ms base
//! the waits are 500ms, 1s, 2s, ... Optional jitter adds up to 25% on top.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always >= 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Backoff to wait after the given failed attempt (1-based), before jitter.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let max_extra = (delay.as_millis() as u64) / 4;
        let extra = rand::thread_rng().gen_range(0..=max_extra);
        delay + Duration::from_millis(extra)
    }
}

/// Outcome of a retried operation: the final result plus how many attempts it took.
#[derive(Debug)]
pub struct Retried<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Runs `op` until it succeeds, `should_retry` rejects the error, or the policy's
/// attempts are exhausted. `op` receives the 1-based attempt number.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    should_retry: P,
    mut op: F,
) -> Retried<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => {
                return Retried {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(e) if attempt < max_attempts && should_retry(&e) => {
                let delay = policy.jittered(policy.delay_after(attempt));
                warn!(
                    "{label}: attempt {attempt}/{max_attempts} failed ({e}), retrying after {}ms",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Retried {
                    result: Err(e),
                    attempts: attempt,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn policy(max_attempts: u32, base_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(base_ms),
            jitter: false,
        }
    }

    #[test]
    fn test_delay_doubles_each_attempt() {
        let p = policy(5, 300);
        assert_eq!(p.delay_after(1), Duration::from_millis(300));
        assert_eq!(p.delay_after(2), Duration::from_millis(600));
        assert_eq!(p.delay_after(3), Duration::from_millis(1200));
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let p = RetryPolicy {
            jitter: true,
            ..policy(3, 400)
        };
        for _ in 0..50 {
            let d = p.jittered(Duration::from_millis(400));
            assert!(d >= Duration::from_millis(400) && d <= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_transient_failures_then_success() {
        let start = Instant::now();
        let seen: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));

        let retried = retry_with_backoff(
            &policy(3, 200),
            "test",
            |_: &String| true,
            |attempt| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(start.elapsed());
                    if attempt < 3 {
                        Err(format!("transient failure #{attempt}"))
                    } else {
                        Ok("scored")
                    }
                }
            },
        )
        .await;

        assert_eq!(retried.attempts, 3);
        assert_eq!(retried.result.unwrap(), "scored");
        let seen = seen.lock().unwrap();
        // d before the 2nd attempt, 2d more before the 3rd
        assert_eq!(seen[1] - seen[0], Duration::from_millis(200));
        assert_eq!(seen[2] - seen[1], Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_return_last_error() {
        let retried: Retried<(), String> = retry_with_backoff(
            &policy(3, 10),
            "test",
            |_| true,
            |attempt| async move { Err(format!("failure {attempt}")) },
        )
        .await;

        assert_eq!(retried.attempts, 3);
        assert_eq!(retried.result.unwrap_err(), "failure 3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_immediately() {
        let retried: Retried<(), String> = retry_with_backoff(
            &policy(5, 10),
            "test",
            |e: &String| !e.contains("fatal"),
            |_| async { Err("fatal: bad request".to_string()) },
        )
        .await;

        assert_eq!(retried.attempts, 1);
    }
}
