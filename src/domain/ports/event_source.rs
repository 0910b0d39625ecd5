//! Event source port.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::SourceError;
use crate::domain::models::RawEvent;

/// Quota and pacing information reported alongside a feed response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateStatus {
    /// Requests left in the current window, if reported
    pub remaining: Option<u32>,
    /// When the current window resets, if reported
    pub reset_at: Option<DateTime<Utc>>,
    /// Minimum delay the source asks for between polls
    pub poll_interval: Option<Duration>,
}

impl RateStatus {
    /// Returns true when the source reported an exhausted quota.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

/// Result of one conditional feed request.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedResponse {
    /// The feed is unchanged since the supplied entity tag
    NotModified {
        /// Quota headers of the response
        rate: RateStatus,
    },
    /// The feed changed; `events` are in feed order (newest first)
    Modified {
        /// Feed entries that decoded as events
        events: Vec<RawEvent>,
        /// Entity tag to send on the next request
        etag: Option<String>,
        /// Quota headers of the response
        rate: RateStatus,
    },
}

impl FeedResponse {
    /// Quota headers, whichever variant this is.
    pub fn rate(&self) -> &RateStatus {
        match self {
            Self::NotModified { rate } | Self::Modified { rate, .. } => rate,
        }
    }
}

/// Upstream event feed, one repository at a time.
///
/// Implementations send `etag` as a conditional-request token so that an
/// unchanged feed costs a cheap confirmation instead of a full payload.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch the newest page of `slug`'s event feed.
    async fn fetch_events(
        &self,
        slug: &str,
        etag: Option<&str>,
    ) -> Result<FeedResponse, SourceError>;
}
