// Retry Policy
// Bounded retries with exponential or fixed backoff, shared by every external call

use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * 2^attempt` (attempt is 0-based)
    Exponential { base: Duration },
    Fixed(Duration),
}

impl Backoff {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Exponential { base } => base.saturating_mul(2u32.saturating_pow(attempt)),
            Backoff::Fixed(delay) => delay,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn exponential(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { base },
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }
}

/// Waits between attempts. Injected so tests can observe backoff without sleeping.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
    /// Errors from attempts that were followed by a retry, oldest first
    pub failures: Vec<E>,
}

/// Run `op` until it succeeds, returns a non-retryable error, or the policy is exhausted.
/// `op` receives the 0-based attempt number.
pub async fn retry<T, E, F, Fut, R>(
    label: &str,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    is_retryable: R,
    mut op: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut failures = Vec::new();
    let mut attempt: u32 = 0;

    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    info!("[RETRY] {} succeeded on attempt {}/{}", label, attempt + 1, max_attempts);
                }
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt + 1,
                    failures,
                };
            }
            Err(e) => {
                warn!(
                    "[RETRY] {} failed (attempt {}/{}): {}",
                    label,
                    attempt + 1,
                    max_attempts,
                    e
                );
                if attempt + 1 >= max_attempts || !is_retryable(&e) {
                    return RetryOutcome {
                        result: Err(e),
                        attempts: attempt + 1,
                        failures,
                    };
                }
                let delay = policy.backoff.delay_after(attempt);
                info!("[RETRY] {} retrying in {:?}", label, delay);
                failures.push(e);
                sleeper.sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::RecordingSleeper;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_schedule() {
        let exp = Backoff::Exponential { base: Duration::from_secs(1) };
        assert_eq!(exp.delay_after(0), Duration::from_secs(1));
        assert_eq!(exp.delay_after(1), Duration::from_secs(2));
        assert_eq!(exp.delay_after(2), Duration::from_secs(4));
        assert_eq!(Backoff::Fixed(Duration::from_secs(1)).delay_after(5), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_retry_exhausts_after_max_attempts() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::exponential(3, Duration::from_secs(1));

        let outcome: RetryOutcome<(), String> = retry("always_fails", &policy, &sleeper, |_| true, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("boom".to_string()) }
        })
        .await;

        assert!(outcome.result.is_err());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.recorded(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn test_retry_stops_on_non_retryable() {
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy::fixed(3, Duration::from_secs(1));

        let outcome: RetryOutcome<(), String> =
            retry("fatal", &policy, &sleeper, |e: &String| e != "fatal", |_| async {
                Err("fatal".to_string())
            })
            .await;

        assert_eq!(outcome.attempts, 1);
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy::fixed(3, Duration::from_secs(1));

        let outcome = retry("flaky", &policy, &sleeper, |_| true, |attempt| async move {
            if attempt < 2 {
                Err(format!("attempt {}", attempt))
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(outcome.result.unwrap(), 2);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.failures, vec!["attempt 0".to_string(), "attempt 1".to_string()]);
        assert_eq!(sleeper.recorded(), vec![Duration::from_secs(1), Duration::from_secs(1)]);
    }
}
