// Bounded polling for eventually consistent remote state

use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use tracing::debug;

use crate::cloud::{ApiError, ApiErrorKind};
use crate::config::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retries: usize,
    interval: Duration,
}

impl RetryPolicy {
    pub fn new(retries: usize, interval: Duration) -> Self {
        Self { retries, interval }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.retries, Duration::from_millis(config.interval_ms))
    }

    /// Total attempts, the first one included.
    pub fn attempts(&self) -> usize {
        self.retries + 1
    }

    /// Run `operation` until it succeeds, fails with something other than
    /// access denied, or the retries run out. The last error is returned.
    pub async fn until_accessible<T, F, Fut>(&self, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let strategy = FixedInterval::new(self.interval).take(self.retries);
        let mut attempt = 0usize;
        RetryIf::spawn(
            strategy,
            || {
                attempt += 1;
                debug!(attempt, max = self.attempts(), "polling for access");
                operation()
            },
            |err: &ApiError| err.is(ApiErrorKind::AccessDenied),
        )
        .await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn gives_up_after_the_configured_retries() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(1));

        let result: Result<(), ApiError> = policy
            .until_accessible(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::of_kind(ApiErrorKind::AccessDenied, "not yet"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), policy.attempts());
    }

    #[tokio::test]
    async fn other_errors_stop_immediately() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(1));

        let result: Result<(), ApiError> = policy
            .until_accessible(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::new("Throttling", "slow down"))
            })
            .await;

        assert_eq!(result.unwrap_err().code, "Throttling");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn returns_first_success() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(1));

        let value = policy
            .until_accessible(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ApiError::of_kind(ApiErrorKind::AccessDenied, "not yet"))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
