// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded retry with a fixed delay.
//!
//! Used for the connectivity check that gates the bootstrap routine. The policy is
//! deliberately flat: a fixed number of attempts separated by a fixed delay, no
//! backoff and no jitter. The caller treats exhaustion as a soft failure.
//!
//! # Example
//!
//! ```
//! use admin_bootstrap::RetryConfig;
//! use std::time::Duration;
//!
//! let config = RetryConfig::default();
//! assert_eq!(config.max_attempts, 3);
//! assert_eq!(config.delay, Duration::from_millis(2000));
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

/// Attempt budget and the pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Pause between consecutive attempts (not after the last).
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::bootstrap()
    }
}

impl RetryConfig {
    /// Startup connectivity gate: 3 attempts, 2 seconds apart.
    #[must_use]
    pub fn bootstrap() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(2000),
        }
    }

    /// Single attempt, no waiting.
    #[must_use]
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        }
    }
}

/// Result of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    Success(T),
    Exhausted { attempts: u32, last_error: E },
}

impl<T, E> RetryOutcome<T, E> {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Exhausted { last_error, .. } => Err(last_error),
        }
    }
}

/// Runs operations under a [`RetryConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> RetryConfig {
        self.config
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    ///
    /// The delay only blocks the calling task.
    pub async fn execute<F, Fut, T, E>(&self, operation_name: &str, mut operation: F) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let started = Instant::now();
        let mut attempts = 0;

        loop {
            match operation().await {
                Ok(val) => {
                    if attempts > 0 {
                        info!("Operation '{}' succeeded after {} retries", operation_name, attempts);
                    }
                    return RetryOutcome::Success(val);
                }
                Err(err) => {
                    attempts += 1;
                    crate::metrics::record_retry_attempt(operation_name);

                    if attempts >= max_attempts {
                        warn!(
                            "Operation '{}' failed (attempt {}/{}): {}. Giving up.",
                            operation_name, attempts, max_attempts, err
                        );
                        crate::metrics::record_retry_exhausted(operation_name, started.elapsed());
                        return RetryOutcome::Exhausted {
                            attempts,
                            last_error: err,
                        };
                    }

                    warn!(
                        "Operation '{}' failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name, attempts, max_attempts, err, self.config.delay
                    );
                    sleep(self.config.delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let result: RetryOutcome<i32, TestError> = RetryExecutor::new(RetryConfig::test())
            .execute("test_op", || async { Ok(42) })
            .await;

        assert_eq!(result, RetryOutcome::Success(42));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result: RetryOutcome<i32, TestError> = RetryExecutor::new(RetryConfig::test())
            .execute("test_op", || {
                let a = attempts_clone.clone();
                async move {
                    let count = a.fetch_add(1, Ordering::SeqCst) + 1;
                    if count < 3 {
                        Err(TestError(format!("fail {}", count)))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.into_result().unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result: RetryOutcome<i32, TestError> = RetryExecutor::new(RetryConfig::test())
            .execute("test_op", || {
                let a = attempts_clone.clone();
                async move {
                    let count = a.fetch_add(1, Ordering::SeqCst) + 1;
                    Err(TestError(format!("fail {}", count)))
                }
            })
            .await;

        match result {
            RetryOutcome::Exhausted { attempts: n, last_error } => {
                assert_eq!(n, 3);
                assert_eq!(last_error, TestError("fail 3".to_string()));
            }
            RetryOutcome::Success(_) => panic!("expected exhaustion"),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_between_attempts_only() {
        let config = RetryConfig {
            max_attempts: 3,
            delay: Duration::from_millis(2000),
        };
        let start = Instant::now();

        let result: RetryOutcome<(), TestError> = RetryExecutor::new(config)
            .execute("test_op", || async { Err(TestError("down".into())) })
            .await;

        assert!(!result.is_success());
        // Two pauses for three attempts, no growth between them
        assert_eq!(start.elapsed(), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn test_zero_attempts_runs_once() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        let config = RetryConfig {
            max_attempts: 0,
            delay: Duration::from_millis(1),
        };

        let _: RetryOutcome<(), TestError> = RetryExecutor::new(config)
            .execute("test_op", || {
                let a = attempts_clone.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(TestError("x".into()))
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retry_config_presets() {
        let bootstrap = RetryConfig::bootstrap();
        assert_eq!(bootstrap.max_attempts, 3);
        assert_eq!(bootstrap.delay, Duration::from_secs(2));
        assert_eq!(RetryConfig::default(), bootstrap);

        let once = RetryConfig::once();
        assert_eq!(once.max_attempts, 1);
        assert_eq!(once.delay, Duration::ZERO);
    }
}
