use std::fmt::Display;
use std::future::Future;

use cs_core::RemoteError;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

/// Exponential backoff: `base_delay * 2^(attempt - 1)` between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Errors that know whether retrying could help.
pub trait RetryClassify {
    fn is_auth_failure(&self) -> bool;
}

impl RetryClassify for RemoteError {
    fn is_auth_failure(&self) -> bool {
        RemoteError::is_auth_failure(self)
    }
}

/// Run `operation` until it succeeds, fails with an auth error, or
/// `max_attempts` is exhausted; the last error is returned.
///
/// The closure receives the 1-based attempt number.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryClassify + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    info!(
                        operation = operation_name,
                        attempt, "operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) if err.is_auth_failure() => {
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    "auth failure, not retrying"
                );
                return Err(err);
            }
            Err(err) if attempt >= max_attempts => {
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    error = %err,
                    "operation failed, retries exhausted"
                );
                return Err(err);
            }
            Err(err) => {
                let backoff = policy.delay_after(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "operation failed, will retry"
                );
                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1_000))
    }

    #[test]
    fn delay_doubles_each_attempt() {
        let policy = policy();
        assert_eq!(policy.delay_after(1), Duration::from_millis(1_000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2_000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(4_000));
    }

    #[tokio::test(start_paused = true)]
    async fn fail_once_then_succeed_waits_one_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result = retry_with_backoff(&policy(), "test", |_| {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(RemoteError::Network("reset".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(Instant::now() - started, Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_is_attempted_once() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), RemoteError> = retry_with_backoff(&policy(), "test", |_| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RemoteError::Unauthorized("expired".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(RemoteError::Unauthorized(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_failure_uses_all_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result: Result<(), RemoteError> = retry_with_backoff(&policy(), "test", |attempt| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RemoteError::Server {
                    status: 500,
                    message: format!("boom {attempt}"),
                })
            }
        })
        .await;

        assert_eq!(
            result,
            Err(RemoteError::Server {
                status: 500,
                message: "boom 3".into()
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(Instant::now() - started, Duration::from_millis(3_000));
    }
}
