//! Bounded retry with exponential backoff for upstream calls.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::errors::SearchError;
use crate::metrics::UPSTREAM_RETRIES_TOTAL;

/// Upper bound on a single backoff delay, before jitter.
const MAX_BACKOFF_DURATION: Duration = Duration::from_secs(5);

/// Growth factor between consecutive retry delays.
const BACKOFF_MULTIPLIER: u32 = 4;

/// How many times, and how patiently, to repeat a failed call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based), including up to 100ms jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = BACKOFF_MULTIPLIER.saturating_pow(retry.saturating_sub(1));
        let base = self
            .initial_backoff
            .saturating_mul(factor)
            .min(MAX_BACKOFF_DURATION);
        let jitter = rand::thread_rng().gen_range(0..100);
        base + Duration::from_millis(jitter)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's retries are used up.
///
/// Only errors for which [`SearchError::is_retryable`] holds are repeated.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, SearchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SearchError>>,
{
    let mut retries_done = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && retries_done < policy.max_retries => {
                retries_done += 1;
                let delay = policy.backoff(retries_done);
                warn!(
                    operation,
                    retry = retries_done,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying upstream call"
                );
                metrics::counter!(UPSTREAM_RETRIES_TOTAL, "operation" => operation.to_string())
                    .increment(1);
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        let first = policy.backoff(1);
        assert!(first >= Duration::from_millis(200) && first < Duration::from_millis(300));
        let second = policy.backoff(2);
        assert!(second >= Duration::from_millis(800) && second < Duration::from_millis(900));
        let capped = policy.backoff(30);
        assert!(capped >= MAX_BACKOFF_DURATION);
        assert!(capped < MAX_BACKOFF_DURATION + Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let attempts = AtomicU32::new(0);
        let result = with_retry(&fast_policy(3), "list_blobs", || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(SearchError::storage_api(503, "ServerBusy"))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(3), "list_blobs", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(SearchError::storage_api(403, "AuthenticationFailed"))
        })
        .await;
        assert!(matches!(
            result,
            Err(SearchError::StorageApi { status: 403, .. })
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transport_errors_exhaust_budget() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(2), "list_blobs", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(SearchError::Transport {
                message: "connection reset".to_string(),
            })
        })
        .await;
        assert!(matches!(result, Err(SearchError::Transport { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_policy() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&RetryPolicy::none(), "list_blobs", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(SearchError::storage_api(500, "InternalError"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
