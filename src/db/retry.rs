//! Bounded retry for transient database failures.
//!
//! # Retry Strategy
//!
//! - Disconnects: linear backoff, `delay * attempt` (1s, 2s, 3s, ...)
//! - Timeouts: flat `delay` between attempts
//! - Everything else: returned immediately
//!
//! The last error is returned unmodified once `attempts` are used up.

use crate::error::{DbResult, RetryClass};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Never zero.
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// A policy that never retries.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Sleep before attempt `attempt + 1`, or `None` when the error class is
    /// not retried.
    pub fn backoff(&self, class: RetryClass, attempt: u32) -> Option<Duration> {
        match class {
            RetryClass::Disconnect => Some(self.delay.saturating_mul(attempt)),
            RetryClass::Timeout => Some(self.delay),
            RetryClass::Permanent => None,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of
/// attempts. The closure receives the 1-based attempt number.
pub async fn run_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut attempt_fn: F,
) -> DbResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let mut attempt = 1;
    loop {
        let err = match attempt_fn(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        let Some(delay) = policy.backoff(err.retry_class(), attempt) else {
            return Err(err);
        };

        if attempt >= policy.attempts {
            error!(
                operation,
                attempts = policy.attempts,
                error = %err,
                "All retry attempts exhausted"
            );
            return Err(err);
        }

        warn!(
            operation,
            attempt,
            max_attempts = policy.attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient failure, retrying"
        );
        sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_backoff_shapes() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(
            policy.backoff(RetryClass::Disconnect, 1),
            Some(Duration::from_secs(1))
        );
        assert_eq!(
            policy.backoff(RetryClass::Disconnect, 3),
            Some(Duration::from_secs(3))
        );
        assert_eq!(
            policy.backoff(RetryClass::Timeout, 3),
            Some(Duration::from_secs(1))
        );
        assert_eq!(policy.backoff(RetryClass::Permanent, 1), None);
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = run_with_retry(fast_policy(3), "test", |attempt| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if attempt < 3 {
                    Err(DbError::connection("server has gone away", ""))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_persistent_fault_returns_original_variant() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: DbResult<()> = run_with_retry(fast_policy(3), "test", |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(DbError::timeout("query execution", 5))
            }
        })
        .await;
        assert!(matches!(result, Err(DbError::Timeout { elapsed_ms: 5, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: DbResult<()> = run_with_retry(fast_policy(5), "test", |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(DbError::statement("syntax error", Some("42000".into()), ""))
            }
        })
        .await;
        assert!(matches!(result, Err(DbError::Statement { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_linear_backoff_total_delay() {
        let start = tokio::time::Instant::now();
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let result: DbResult<()> = run_with_retry(policy, "test", |_| async {
            Err(DbError::connection("refused", ""))
        })
        .await;
        assert!(result.is_err());
        // 1s after attempt 1, 2s after attempt 2, none after the last
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }
}
