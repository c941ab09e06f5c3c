use crate::{HeatmapError, Result};
use std::future::Future;
use std::time::Duration;

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Wait `base_delay` between every pair of attempts.
    #[default]
    Fixed,
    /// Double the delay after each failure, capped at `max_delay`.
    Exponential {
        /// Upper bound for a single delay
        max_delay: Duration,
    },
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Growth of the delay for later failures
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryConfig {
    /// A config that never waits between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            backoff: Backoff::Fixed,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential { max_delay } => {
                let factor = 2_u32.saturating_pow(failed_attempt.saturating_sub(1));
                std::cmp::min(self.base_delay.saturating_mul(factor), max_delay)
            }
        }
    }
}

/// Result of a retry operation with context
#[derive(Debug)]
pub struct RetryResult<T> {
    /// The successful result
    pub result: T,
    /// Number of attempts made, including the successful one
    pub attempts_made: u32,
    /// Total time spent waiting between attempts
    pub total_retry_time: Duration,
}

/// Execute an async operation, retrying the failures `should_retry` accepts.
///
/// Errors rejected by `should_retry` (usually [`HeatmapError::is_retryable`])
/// are returned immediately. Otherwise the operation is attempted up to
/// `config.max_attempts` times, sleeping according to the backoff policy
/// between attempts. No sleep follows the final attempt.
///
/// # Arguments
/// * `config` - Retry configuration
/// * `operation_name` - Name of the operation for logging
/// * `should_retry` - Whether an error is worth another attempt
/// * `operation` - Async function that returns a Result
/// * `on_failure` - Callback for every failed attempt (attempt number, error)
pub async fn retry_with_backoff<T, F, Fut, ShouldRetry, OnFailure>(
    config: &RetryConfig,
    operation_name: &str,
    should_retry: ShouldRetry,
    mut operation: F,
    mut on_failure: OnFailure,
) -> Result<RetryResult<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    ShouldRetry: Fn(&HeatmapError) -> bool,
    OnFailure: FnMut(u32, &HeatmapError),
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    let mut total_retry_time = Duration::ZERO;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => {
                return Ok(RetryResult {
                    result,
                    attempts_made: attempt,
                    total_retry_time,
                });
            }
            Err(error) => {
                on_failure(attempt, &error);

                if !should_retry(&error) {
                    return Err(error);
                }

                if attempt >= max_attempts {
                    log::warn!("Max attempts ({max_attempts}) exhausted for {operation_name}");
                    return Err(error);
                }

                let delay = config.delay_after(attempt);
                log::debug!(
                    "{} failed, waiting {:?} before attempt {} of {}",
                    operation_name,
                    delay,
                    attempt + 1,
                    max_attempts
                );

                tokio::time::sleep(delay).await;
                total_retry_time += delay;
            }
        }
    }
}
