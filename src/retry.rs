use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::config::DEFAULT_RETRY_BACKOFF;

const MAX_ATTEMPTS: u32 = 2;

/// Bounded retry with a fixed pause between attempts. No jitter, no growth:
/// every attempt already carries its own request timeout.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn with_backoff(backoff: Duration) -> Self {
        Self {
            backoff,
            ..Self::default()
        }
    }
}

/// Run `op`, retrying failures that `retriable` accepts until
/// `policy.max_attempts` is reached. The last failure is returned unchanged.
pub async fn with_retry<T, E, R, F, Fut>(
    policy: RetryPolicy,
    retriable: R,
    mut op: F,
) -> Result<T, E>
where
    R: Fn(&E) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && retriable(&e) => {
                debug!(
                    attempt,
                    error = %e,
                    delay_ms = policy.backoff.as_millis() as u64,
                    "retrying after failure"
                );
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn always(_: &String) -> bool {
        true
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_attempt_does_not_wait() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let start = Instant::now();

        let result: Result<u32, String> = with_retry(RetryPolicy::default(), always, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn one_failure_then_success_waits_one_backoff() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let start = Instant::now();

        let result: Result<&str, String> =
            with_retry(RetryPolicy::default(), always, || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err("connection reset".to_string())
                } else {
                    Ok("defined")
                }
            })
            .await;

        assert_eq!(result, Ok("defined"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "waited {elapsed:?}");
        assert!(elapsed < Duration::from_millis(310), "waited {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn two_failures_return_last_error_without_third_attempt() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<(), String> = with_retry(RetryPolicy::default(), always, || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Err(format!("failure {n}"))
        })
        .await;

        assert_eq!(result, Err("failure 1".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_backoff_is_honoured() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let start = Instant::now();

        let _: Result<(), String> =
            with_retry(RetryPolicy::with_backoff(Duration::from_millis(50)), always, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("boom".to_string())
            })
            .await;

        let elapsed = start.elapsed();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(elapsed >= Duration::from_millis(50), "waited {elapsed:?}");
        assert!(elapsed < Duration::from_millis(60), "waited {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_error_returns_without_retry() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let start = Instant::now();

        let result: Result<(), String> = with_retry(
            RetryPolicy::default(),
            |e: &String| !e.starts_with("invalid"),
            || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("invalid endpoint".to_string())
            },
        )
        .await;

        assert_eq!(result, Err("invalid endpoint".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
