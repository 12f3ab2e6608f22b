//! Retry logic for transient failures with linear backoff.
//!
//! Whether an error is worth another attempt is decided by the error type
//! itself through [`Retryable`], never by inspecting message text. Server
//! supplied hints (Telegram `RetryAfter`) take precedence over the schedule.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Retry-related errors.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// All attempts used, or the error was not retryable
    #[error("Gave up after {attempts} attempt(s)")]
    GaveUp { attempts: u32, last_error: E },
}

impl<E> RetryError<E> {
    /// Returns the error of the final attempt.
    pub fn into_last_error(self) -> E {
        match self {
            RetryError::GaveUp { last_error, .. } => last_error,
        }
    }
}

/// Retry strategy configuration.
///
/// The delay after failed attempt `n` (1-based) is `base_delay * n`, capped
/// at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay unit of the linear schedule
    pub base_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the total number of attempts (at least one).
    #[must_use]
    pub fn max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max.max(1);
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.max(1)).min(self.max_delay)
    }
}

/// Predefined retry configs for different scenarios.
impl RetryConfig {
    /// Direct stream retrieval: 3 attempts, 2 s unit.
    pub fn retrieval() -> Self {
        Self::new()
            .max_attempts(crate::core::config::download::MAX_ATTEMPTS)
            .base_delay(crate::core::config::download::retry_base_delay())
    }

    /// Archive uploads: 3 attempts, 2 s unit.
    pub fn upload() -> Self {
        Self::new()
            .max_attempts(crate::core::config::upload::MAX_ATTEMPTS)
            .base_delay(crate::core::config::upload::retry_base_delay())
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    /// The final result (success or last error)
    pub result: Result<T, RetryError<E>>,
    /// Number of attempts made
    pub attempts: u32,
    /// Total time spent, including sleeps
    pub total_duration: Duration,
}

impl<T, E> RetryResult<T, E> {
    /// Returns true if the operation succeeded.
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Collapses into a plain result carrying the last error.
    pub fn into_result(self) -> Result<T, E> {
        self.result.map_err(RetryError::into_last_error)
    }
}

/// Determines if an error is retryable.
pub trait Retryable {
    /// Returns true if the error should be retried.
    fn is_retryable(&self) -> bool;

    /// Returns an optional hint for retry delay (e.g., from rate limit headers).
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for teloxide::RequestError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            teloxide::RequestError::Network(_)
                | teloxide::RequestError::RetryAfter(_)
                | teloxide::RequestError::Io(_)
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        if let teloxide::RequestError::RetryAfter(seconds) = self {
            Some(seconds.duration())
        } else {
            None
        }
    }
}

/// Executes an async operation with retry logic.
///
/// `operation` receives the 1-based attempt number. Non-retryable errors end
/// the loop immediately.
pub async fn retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let start = tokio::time::Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation(attempts).await {
            Ok(value) => {
                return RetryResult {
                    result: Ok(value),
                    attempts,
                    total_duration: start.elapsed(),
                };
            }
            Err(e) if attempts < config.max_attempts && e.is_retryable() => {
                let delay = e.retry_after().unwrap_or_else(|| config.delay_for_attempt(attempts));

                log::warn!(
                    "Attempt {}/{} failed (retrying in {:?}): {}",
                    attempts,
                    config.max_attempts,
                    delay,
                    e
                );

                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return RetryResult {
                    result: Err(RetryError::GaveUp {
                        attempts,
                        last_error: e,
                    }),
                    attempts,
                    total_duration: start.elapsed(),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError(bool); // bool = is_retryable

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError(retryable={})", self.0)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    fn fast() -> RetryConfig {
        RetryConfig::new().base_delay(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let result = retry(&fast(), |_| async { Ok::<_, TestError>(42) }).await;

        assert!(result.is_ok());
        assert_eq!(result.attempts, 1);
        assert_eq!(result.into_result().unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry(&fast(), |_| {
            let counter = counter_clone.clone();
            async move {
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                if attempt < 2 { Err(TestError(true)) } else { Ok(42) }
            }
        })
        .await;

        assert_eq!(result.attempts, 3);
        assert_eq!(result.into_result().unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_exhausted_after_max_attempts() {
        let result = retry(&fast(), |_| async { Err::<i32, _>(TestError(true)) }).await;

        assert!(!result.is_ok());
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry(&fast(), |_| {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError(false))
            }
        })
        .await;

        assert_eq!(result.attempts, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_number_passed_through() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let _ = retry(&fast(), |attempt| {
            seen_clone.lock().unwrap().push(attempt);
            async { Err::<(), _>(TestError(true)) }
        })
        .await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_linear_delay_calculation() {
        let config = RetryConfig::new()
            .base_delay(Duration::from_secs(2))
            .max_delay(Duration::from_secs(5));

        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(5)); // capped
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_sleep_is_linear() {
        let config = RetryConfig::new().base_delay(Duration::from_secs(2));
        let result = retry(&config, |_| async { Err::<(), _>(TestError(true)) }).await;

        // 2 s after attempt 1, 4 s after attempt 2, none after the last
        assert_eq!(result.total_duration, Duration::from_secs(6));
    }
}
