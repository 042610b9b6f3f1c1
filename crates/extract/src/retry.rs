use ingest::{Error, Result};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

type RetryPredicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Exponential backoff applied uniformly to remote calls
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    min_wait: Duration,
    max_wait: Duration,
    retry_predicate: RetryPredicate,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("min_wait", &self.min_wait)
            .field("max_wait", &self.max_wait)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(10))
    }
}

impl RetryPolicy {
    /// Retries transient provider errors only
    pub fn new(max_attempts: usize, min_wait: Duration, max_wait: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_wait,
            max_wait: max_wait.max(min_wait),
            retry_predicate: Arc::new(Error::is_transient),
        }
    }

    pub fn with_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.retry_predicate = Arc::new(predicate);
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Wait before attempt `attempt + 1`, given `attempt` failures so far
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        self.min_wait
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_wait)
    }

    /// Run `f` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent
    pub async fn run<F, Fut, T>(&self, operation_name: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            match f().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(result);
                }
                Err(e) => {
                    attempt += 1;
                    if !(self.retry_predicate)(&e) {
                        return Err(e);
                    }
                    if attempt >= self.max_attempts {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %e,
                            "Operation failed after max attempts"
                        );
                        return Err(e);
                    }

                    let backoff = self.backoff(attempt);
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Operation failed, retrying"
                    );

                    sleep(backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5))
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(5), Duration::from_secs(10));
        assert_eq!(policy.backoff(100), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result = fast_policy()
            .run("flaky", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::TransientProvider("429".to_string()))
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<()> = fast_policy()
            .run("down", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::TransientProvider("503".to_string()))
            })
            .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<()> = fast_policy()
            .run("bad request", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Provider("400".to_string()))
            })
            .await;

        assert!(matches!(result, Err(Error::Provider(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_custom_predicate() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let policy = fast_policy().with_predicate(|e| matches!(e, Error::WriteUnavailable(_)));
        let result: Result<()> = policy
            .run("write", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::WriteUnavailable("connection refused".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
