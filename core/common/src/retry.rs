//! Retry strategy with linear backoff for remote calls.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first one.
    pub max_retries: u32,
    /// Delay unit; the n-th retry waits `n * delay_step`.
    pub delay_step: Duration,
}

impl RetryConfig {
    /// Create a new retry configuration with a one second step.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            delay_step: Duration::from_secs(1),
        }
    }

    /// Set the delay step.
    pub fn with_delay_step(mut self, step: Duration) -> Self {
        self.delay_step = step;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delay_step.saturating_mul(attempt)
    }

    /// The whole delay schedule, one entry per retry.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_retries).map(|attempt| self.delay_for_attempt(attempt))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// A failure that ended a retry loop.
#[derive(Debug, Clone)]
pub struct Exhausted {
    /// The last error observed.
    pub error: Error,
    /// How many attempts were made in total.
    pub attempts: u32,
}

/// Retry executor for running operations with retry logic.
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute an operation, retrying transient errors.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_with_condition(operation, Error::is_transient)
            .await
            .map_err(|exhausted| exhausted.error)
    }

    /// Execute with a custom retry condition.
    ///
    /// The operation receives the 1-based attempt number. Attempts run
    /// strictly one after another.
    pub async fn execute_with_condition<F, Fut, T, C>(
        &self,
        mut operation: F,
        should_retry: C,
    ) -> std::result::Result<T, Exhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        C: Fn(&Error) -> bool,
    {
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!("Operation succeeded after {} retries", attempt - 1);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !should_retry(&error) || attempt > self.config.max_retries {
                        if attempt > 1 {
                            warn!("Operation failed after {} attempts: {}", attempt, error);
                        }
                        return Err(Exhausted {
                            error,
                            attempts: attempt,
                        });
                    }

                    let delay = self.config.delay_for_attempt(attempt);
                    warn!(
                        "Attempt {} failed: {}. Retrying in {:?}...",
                        attempt, error, delay
                    );

                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Get the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_linear_delay_schedule() {
        let config = RetryConfig::new(3);
        let schedule: Vec<Duration> = config.schedule().collect();

        assert_eq!(
            schedule,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3)
            ]
        );
    }

    #[test]
    fn test_custom_delay_step() {
        let config = RetryConfig::new(3).with_delay_step(Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_successful_operation() {
        let executor = RetryExecutor::default();

        let result: Result<i32> = executor.execute(|_| async { Ok(42) }).await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_on_network_error() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let count_clone = attempt_count.clone();

        let executor = RetryExecutor::new(RetryConfig::new(3));

        let result: Result<i32> = executor
            .execute(move |_| {
                let count = count_clone.clone();
                async move {
                    let current = count.fetch_add(1, Ordering::SeqCst);
                    if current < 2 {
                        Err(Error::Network("Connection failed".to_string()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_linearly() {
        let started = tokio::time::Instant::now();
        let executor = RetryExecutor::new(RetryConfig::new(2));

        let result: Result<()> = executor
            .execute(|_| async { Err(Error::Network("down".to_string())) })
            .await;

        assert!(result.is_err());
        // 1s + 2s of backoff between three attempts.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_non_retryable_error() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let count_clone = attempt_count.clone();

        let executor = RetryExecutor::default();

        let result: Result<i32> = executor
            .execute(move |_| {
                let count = count_clone.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Err(Error::NotFound("File not found".to_string()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_retries_exceeded() {
        let executor = RetryExecutor::new(RetryConfig::new(2));

        let result: std::result::Result<i32, Exhausted> = executor
            .execute_with_condition(
                |attempt| async move { Err(Error::Network(format!("attempt {}", attempt))) },
                Error::is_transient,
            )
            .await;

        let exhausted = result.unwrap_err();
        // Initial + 2 retries = 3 attempts, reporting the last failure.
        assert_eq!(exhausted.attempts, 3);
        assert!(exhausted.error.to_string().contains("attempt 3"));
    }
}
