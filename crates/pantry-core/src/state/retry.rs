//! Bounded retry of transient storage failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{PlanError, PlanResult};

/// SQLSTATE codes worth retrying: serialization failure and deadlock.
const RETRYABLE_SQLSTATES: &[&str] = &["40001", "40P01"];

/// Exponential backoff with full jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 50,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Upper bound of the sleep before attempt `attempt + 1`.
    fn backoff_cap(&self, attempt: u32) -> Duration {
        let exp = self
            .initial_backoff_ms
            .saturating_mul(1u64 << attempt.saturating_sub(1).min(20));
        Duration::from_millis(exp.min(self.max_backoff_ms))
    }
}

/// Whether `err` came from a failure that may succeed on retry.
pub fn is_transient(err: &PlanError) -> bool {
    let PlanError::Store(source) = err else {
        return false;
    };
    source.chain().any(|cause| match cause.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut) => true,
        Some(sqlx::Error::Database(db)) => db
            .code()
            .is_some_and(|code| RETRYABLE_SQLSTATES.contains(&&*code)),
        _ => false,
    })
}

/// Run `op` until it succeeds, fails with a non-transient error, runs out
/// of attempts, or `cancel` fires.
///
/// Each attempt gets a fresh future, so a transaction opened inside `op`
/// is rolled back (dropped) before the next one starts.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut op: F,
) -> PlanResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PlanResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = tokio::select! {
            result = op() => result,
            _ = cancel.cancelled() => return Err(PlanError::Cancelled),
        };

        match result {
            Err(e) if is_transient(&e) => {
                if attempt >= max_attempts {
                    let PlanError::Store(source) = e else {
                        return Err(e);
                    };
                    return Err(PlanError::Transient {
                        attempts: attempt,
                        source,
                    });
                }
                let cap = policy.backoff_cap(attempt);
                let delay = Duration::from_millis(
                    rand::rng().random_range(0..=cap.as_millis() as u64),
                );
                tracing::warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(PlanError::Cancelled),
                }
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn transient() -> PlanError {
        PlanError::Store(anyhow::Error::new(sqlx::Error::PoolTimedOut).context("failed to begin"))
    }

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn classifies_pool_timeout_as_transient() {
        assert!(is_transient(&transient()));
        assert!(!is_transient(&PlanError::Conflict("x".into())));
        assert!(!is_transient(&PlanError::Store(anyhow::anyhow!("constraint violated"))));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff_ms: 50,
            max_backoff_ms: 300,
        };
        assert_eq!(policy.backoff_cap(1), Duration::from_millis(50));
        assert_eq!(policy.backoff_cap(2), Duration::from_millis(100));
        assert_eq!(policy.backoff_cap(3), Duration::from_millis(200));
        assert_eq!(policy.backoff_cap(4), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = with_retry(&fast(), &CancellationToken::new(), "test", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: PlanResult<()> = with_retry(&fast(), &CancellationToken::new(), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;
        assert!(matches!(result, Err(PlanError::Transient { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: PlanResult<()> = with_retry(&fast(), &CancellationToken::new(), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(PlanError::Conflict("nope".into()))
        })
        .await;
        assert!(matches!(result, Err(PlanError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_token_stops_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: PlanResult<()> = with_retry(&fast(), &cancel, "test", || async {
            std::future::pending::<PlanResult<()>>().await
        })
        .await;
        assert!(matches!(result, Err(PlanError::Cancelled)));
    }
}
