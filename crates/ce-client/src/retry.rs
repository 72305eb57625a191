//! Retry with exponential backoff and cancellable sleeps.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::error::CeError;
use crate::limiter::RateLimiter;
use crate::Result;

/// Backoff schedule for retryable failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Wait before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for the doubling backoff.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_backoff: Duration::from_millis(600),
            max_backoff: Duration::from_secs(6),
        }
    }
}

impl RetryPolicy {
    /// Backoff to use after `current`.
    pub fn next_backoff(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_backoff)
    }
}

/// Sleep for `duration` unless `cancel` fires first.
pub async fn sleep_cancellable(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = cancel.cancelled() => Err(CeError::Cancelled),
    }
}

fn retry_after_hint(err: &CeError) -> Option<Duration> {
    match err {
        CeError::Http { retry_after, .. } => *retry_after,
        _ => None,
    }
}

/// Run `op` through the rate limiter, retrying retryable failures.
///
/// `op` receives the 1-based attempt number. Non-retryable errors and
/// cancellation return immediately; the last retryable error is returned
/// once `max_attempts` is exhausted. A server `Retry-After` hint replaces
/// the computed backoff for that wait.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    limiter: &RateLimiter,
    cancel: &CancellationToken,
    label: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.initial_backoff;
    let mut attempt = 1;

    loop {
        if cancel.is_cancelled() {
            return Err(CeError::Cancelled);
        }
        limiter.wait(cancel).await?;

        let outcome = tokio::select! {
            r = op(attempt) => r,
            _ = cancel.cancelled() => return Err(CeError::Cancelled),
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if err.is_cancelled() {
            return Err(err);
        }
        if !err.is_retryable() || attempt >= max_attempts {
            error!(target_label = %label, attempt, error = %err, "request failed");
            return Err(err);
        }

        let wait = retry_after_hint(&err).unwrap_or(backoff);
        warn!(
            target_label = %label,
            attempt,
            wait_ms = wait.as_millis() as u64,
            error = %err,
            "retrying request"
        );
        sleep_cancellable(wait, cancel).await?;
        backoff = policy.next_backoff(backoff);
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn unavailable() -> CeError {
        CeError::Http {
            status: 503,
            url: "u".into(),
            body: String::new(),
            retry_after: None,
        }
    }

    fn no_limit() -> RateLimiter {
        RateLimiter::new(Duration::ZERO)
    }

    #[test]
    fn test_policy_defaults_and_cap() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 6);
        assert_eq!(p.initial_backoff, Duration::from_millis(600));
        let mut b = p.initial_backoff;
        let mut seen = Vec::new();
        for _ in 0..5 {
            b = p.next_backoff(b);
            seen.push(b);
        }
        assert_eq!(
            seen,
            vec![
                Duration::from_millis(1200),
                Duration::from_millis(2400),
                Duration::from_millis(4800),
                Duration::from_secs(6),
                Duration::from_secs(6),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let token = CancellationToken::new();
        let start = Instant::now();

        let value = retry_with_backoff(&RetryPolicy::default(), &no_limit(), &token, "t", |_| {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(unavailable())
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 600ms + 1200ms of backoff
        assert!(start.elapsed() >= Duration::from_millis(1800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let token = CancellationToken::new();

        let err = retry_with_backoff(&RetryPolicy::default(), &no_limit(), &token, "t", |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(unavailable())
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, CeError::Http { status: 503, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let token = CancellationToken::new();

        let err = retry_with_backoff(&RetryPolicy::default(), &no_limit(), &token, "t", |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(CeError::Http {
                    status: 404,
                    url: "u".into(),
                    body: "nope".into(),
                    retry_after: None,
                })
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, CeError::Http { status: 404, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_is_honored() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let token = CancellationToken::new();
        let start = Instant::now();

        retry_with_backoff(&RetryPolicy::default(), &no_limit(), &token, "t", |_| {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(CeError::Http {
                        status: 429,
                        url: "u".into(),
                        body: String::new(),
                        retry_after: Some(Duration::from_secs(3)),
                    })
                } else {
                    Ok(())
                }
            }
        })
        .await
        .unwrap();

        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let policy = RetryPolicy {
            max_attempts: 6,
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(60),
        };
        let start = Instant::now();
        let err = retry_with_backoff(&policy, &no_limit(), &token, "t", |_| async {
            Err::<(), _>(unavailable())
        })
        .await
        .unwrap_err();

        assert!(err.is_cancelled());
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
