//! Exponential backoff shared by the poller and the delivery engine.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::errors::{DeliveryError, SourceError};
use crate::domain::models::RetryConfig;

/// Errors that can tell the retry loop whether another attempt makes sense.
pub trait Retryable: std::fmt::Display {
    /// Whether another attempt could succeed
    fn is_transient(&self) -> bool;

    /// Server-provided minimum wait before the next attempt
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for SourceError {
    fn is_transient(&self) -> bool {
        SourceError::is_transient(self)
    }
}

impl Retryable for DeliveryError {
    fn is_transient(&self) -> bool {
        DeliveryError::is_transient(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        DeliveryError::retry_after(self)
    }
}

/// Why [`RetryPolicy::execute`] gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// The error was not worth retrying
    Permanent {
        /// The failure that stopped the retries
        error: E,
        /// Attempts made, including the first
        attempts: u32,
    },
    /// Every allowed attempt failed with a transient error
    Exhausted {
        /// The last failure
        error: E,
        /// Attempts made, including the first
        attempts: u32,
    },
}

impl<E> RetryError<E> {
    /// The error of the last attempt.
    pub fn into_error(self) -> E {
        match self {
            Self::Permanent { error, .. } | Self::Exhausted { error, .. } => error,
        }
    }

    /// Total attempts made, including the first
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Permanent { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// True when the error was transient but retries ran out.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Retry policy with exponential backoff
///
/// Backoff doubles with each retry (`initial * 2^attempt`) and is capped at
/// `max_backoff_ms`. A server-provided retry-after hint raises the delay but
/// never lowers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    max_retries: u32,
    /// Initial backoff duration in milliseconds
    initial_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds
    max_backoff_ms: u64,
}

impl RetryPolicy {
    /// Policy with up to `max_retries` retries after the first attempt.
    ///
    /// A maximum below the initial backoff is raised to it.
    pub fn new(max_retries: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff_ms,
            max_backoff_ms: max_backoff_ms.max(initial_backoff_ms),
        }
    }

    /// Policy from a `retry` configuration section.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            config.initial_backoff_ms,
            config.max_backoff_ms,
        )
    }

    /// Retries allowed after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Execute an operation, retrying transient failures.
    ///
    /// The closure receives the zero-based attempt number.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable,
    {
        let mut attempt = 0;

        loop {
            match operation(attempt).await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "Operation succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !error.is_transient() {
                        debug!(%error, "Permanent error, not retrying");
                        return Err(RetryError::Permanent {
                            error,
                            attempts: attempt + 1,
                        });
                    }
                    if attempt >= self.max_retries {
                        return Err(RetryError::Exhausted {
                            error,
                            attempts: attempt + 1,
                        });
                    }

                    let delay = self.delay_for(attempt, &error);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        %error,
                        "Transient error, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Calculate exponential backoff duration for the given attempt
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt);
        let backoff_ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(backoff_ms)
    }

    /// Backoff for `attempt`, raised to the error's retry-after hint if larger.
    pub fn delay_for<E: Retryable>(&self, attempt: u32, error: &E) -> Duration {
        let backoff = self.calculate_backoff(attempt);
        error
            .retry_after()
            .map_or(backoff, |hint| hint.max(backoff))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
