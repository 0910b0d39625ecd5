//! Domain errors for the Mercourier relay.
//!
//! Each boundary owns one error enum. Adapters classify their failures into
//! these variants so the services can decide between retrying, cooling down and
//! giving up without knowing which HTTP library produced the failure.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised while fetching an event feed from the event source.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Connection, DNS or TLS failure
    #[error("Network error: {0}")]
    Network(String),

    /// Request did not complete within the client timeout
    #[error("Request timeout")]
    Timeout,

    /// Event source answered with a 5xx status
    #[error("Server error ({status}): {body}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Error message from the response body
        body: String,
    },

    /// Request quota exhausted until `reset_at`
    #[error("Rate limit exceeded{}", reset_suffix(.reset_at))]
    RateLimited {
        /// When the quota resets, if the source said so
        reset_at: Option<DateTime<Utc>>,
    },

    /// Token rejected (HTTP 401, or 403 without rate-limit signs)
    #[error("Bad credentials: {0}")]
    BadCredentials(String),

    /// Repository does not exist or is not visible with the given token
    #[error("Repository not found: {0}")]
    NotFound(String),

    /// Response body could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Any other non-success status
    #[error("Unexpected status ({status}): {body}")]
    Unexpected {
        /// HTTP status code
        status: u16,
        /// Error message from the response body
        body: String,
    },
}

fn reset_suffix(reset_at: &Option<DateTime<Utc>>) -> String {
    reset_at
        .map(|at| format!(" until {}", at.format("%Y-%m-%d %H:%M:%S UTC")))
        .unwrap_or_default()
}

impl SourceError {
    /// Returns true if the failure is worth retrying within the same poll cycle.
    ///
    /// Rate limiting is not transient here: the poller turns it into a
    /// per-repository cooldown instead of spinning on retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout | Self::Server { .. }
        )
    }

    /// Returns true for failures that will not go away by retrying.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::BadCredentials(_) | Self::NotFound(_) | Self::Unexpected { .. }
        )
    }
}

/// Errors raised by a [`Deliverer`](crate::domain::ports::Deliverer).
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Connection, DNS or TLS failure
    #[error("Network error: {0}")]
    Network(String),

    /// Request did not complete within the client timeout
    #[error("Request timeout")]
    Timeout,

    /// Chat server answered with a 5xx status
    #[error("Server error ({status}): {body}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Error message from the response body
        body: String,
    },

    /// Chat server asked us to slow down
    #[error("Rate limit exceeded")]
    RateLimited {
        /// Wait advertised by the server
        retry_after: Option<Duration>,
    },

    /// Account email or API key rejected
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Malformed topic/body or any other 4xx
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl DeliveryError {
    /// Returns true if the delivery should be attempted again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout | Self::Server { .. } | Self::RateLimited { .. }
        )
    }

    /// Server-provided hint for how long to wait before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Errors raised by watermark stores.
#[derive(Debug, Error)]
pub enum StateError {
    /// Reading, writing or renaming the state file failed
    #[error("State file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The state file could not be encoded or decoded
    #[error("State file is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}
