//! Delivery engine.
//!
//! Sends one [`DeliveryTask`] through a [`Deliverer`], retrying transient
//! failures with exponential backoff and honoring retry-after hints. A task
//! that cannot be delivered is logged once at error level and dropped; it is
//! never requeued.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{debug, error, instrument};

use crate::domain::errors::DeliveryError;
use crate::domain::models::DeliveryTask;
use crate::domain::ports::Deliverer;
use crate::infrastructure::retry::{RetryError, RetryPolicy};

/// Why a delivery was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The chat server rejected the message; retrying would not help
    Permanent,
    /// Every attempt failed transiently
    Exhausted,
}

/// Terminal result of [`DeliveryEngine::deliver`].
#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
    /// The chat server accepted the message
    Delivered {
        /// Attempts made, including the first
        attempts: u32,
    },
    /// The message was abandoned
    Failed {
        /// Whether the failure was permanent or retries ran out
        kind: FailureKind,
        /// Attempts made, including the first
        attempts: u32,
        /// Error of the last attempt
        error: DeliveryError,
    },
}

impl DeliveryOutcome {
    /// True if the message was accepted.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Retrying front of a [`Deliverer`]. Cheap to share behind an `Arc`.
pub struct DeliveryEngine {
    deliverer: Arc<dyn Deliverer>,
    retry: RetryPolicy,
}

impl DeliveryEngine {
    /// Engine that retries `deliverer` under `retry`.
    pub fn new(deliverer: Arc<dyn Deliverer>, retry: RetryPolicy) -> Self {
        Self { deliverer, retry }
    }

    /// Deliver `task`, consuming it.
    #[instrument(skip_all, fields(topic = %task.topic, deliverer = self.deliverer.name()))]
    pub async fn deliver(&self, mut task: DeliveryTask) -> DeliveryOutcome {
        let attempts = AtomicU32::new(0);
        let result = {
            let deliverer = &self.deliverer;
            let attempts = &attempts;
            let task = &task;
            self.retry
                .execute(move |attempt| {
                    attempts.store(attempt + 1, Ordering::Relaxed);
                    deliverer.send(task)
                })
                .await
        };
        task.attempt = attempts.load(Ordering::Relaxed);

        match result {
            Ok(()) => {
                debug!(attempts = task.attempt, "Message delivered");
                DeliveryOutcome::Delivered {
                    attempts: task.attempt,
                }
            }
            Err(failure) => {
                let kind = match failure {
                    RetryError::Permanent { .. } => FailureKind::Permanent,
                    RetryError::Exhausted { .. } => FailureKind::Exhausted,
                };
                let attempts = failure.attempts();
                let error = failure.into_error();
                error!(
                    attempts,
                    ?kind,
                    %error,
                    enqueued_at = %task.first_enqueued_at,
                    "Delivery abandoned"
                );
                DeliveryOutcome::Failed {
                    kind,
                    attempts,
                    error,
                }
            }
        }
    }
}
