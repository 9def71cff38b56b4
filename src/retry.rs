//! Bounded retry logic for resource fetches
//!
//! A resource is attempted a fixed number of times with a delay between
//! attempts. The delay is constant by default; a `backoff_multiplier` above 1.0
//! turns it into exponential backoff, and optional jitter spreads retries out.
//!
//! # Example
//!
//! ```no_run
//! use ocr_harvest::retry::{IsRetryable, with_retry};
//! use ocr_harvest::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), ocr_harvest::retry::Exhausted<MyError>> {
//! let config = RetryConfig::default();
//! let value = with_retry(&config, || async {
//!     Ok::<_, MyError>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, server errors, corrupted transfers) should
/// return `true`. Failures that another attempt cannot fix should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            // Connection failures, timeouts and truncated bodies
            FetchError::Http { .. } => true,
            // Any non-success status; the archive server answers 5xx under load
            FetchError::Status { .. } => true,
            // A corrupted transfer may succeed next time
            FetchError::ChecksumMismatch { .. } => true,
            // Disk hiccups are retried, a full disk will fail every attempt anyway
            FetchError::Write { .. } => true,
            // The metadata does not change between attempts
            FetchError::ResourceNotFound { .. }
            | FetchError::MissingAttribute { .. }
            | FetchError::InvalidUrl { .. }
            | FetchError::UnknownChecksum { .. }
            | FetchError::Metadata(_)
            | FetchError::BundleUnavailable { .. } => false,
        }
    }
}

/// The error of the last attempt, with the number of attempts made
#[derive(Debug)]
pub struct Exhausted<E> {
    /// Error returned by the final attempt
    pub error: E,
    /// How many times the operation ran
    pub attempts: u32,
}

impl<E: std::fmt::Display> std::fmt::Display for Exhausted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (after {} attempt(s))", self.error, self.attempts)
    }
}

impl<E: std::error::Error + 'static> std::error::Error for Exhausted<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.error)
    }
}

/// Execute an async operation, retrying transient failures
///
/// # Arguments
///
/// * `config` - Retry configuration (attempts, delays, backoff multiplier, jitter)
/// * `operation` - Async closure that returns Result<T, E> where E implements IsRetryable
///
/// # Returns
///
/// The successful result, or the last error together with the attempt count once
/// attempts are exhausted or a permanent error occurs.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, Exhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;
    let mut delay = config.initial_delay;

    loop {
        attempts += 1;
        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    tracing::info!(attempts, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempts < max_attempts => {
                tracing::warn!(
                    error = %e,
                    attempt = attempts,
                    max_attempts,
                    delay_ms = delay.as_millis(),
                    "operation failed, retrying"
                );

                let wait = if config.jitter { add_jitter(delay) } else { delay };
                tokio::time::sleep(wait).await;

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(error = %e, attempts, "operation failed after all attempts");
                } else {
                    tracing::warn!(error = %e, "operation failed with non-retryable error");
                }
                return Err(Exhausted { error: e, attempts });
            }
        }
    }
}

/// Add random jitter to a delay
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
