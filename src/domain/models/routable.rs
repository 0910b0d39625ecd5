//! Values handed from classification to delivery.

use chrono::{DateTime, Utc};

use super::event::{EventId, EventType, RawEvent};

/// Where a routable message came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOrigin {
    /// A GitHub feed event
    GitHub {
        /// Feed id of the event
        event_id: EventId,
        /// Event type as reported by the feed
        event_type: EventType,
        /// `owner/name` of the repository
        repo: String,
    },
    /// A log record of this process
    Log {
        /// Level name of the record
        level: String,
    },
}

impl EventOrigin {
    /// Origin of a GitHub feed event.
    pub fn github(event: &RawEvent) -> Self {
        Self::GitHub {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            repo: event.repo_name().to_string(),
        }
    }
}

/// An event that has a destination topic and a rendered body.
///
/// Construction goes through [`RoutableEvent::new`], which refuses empty
/// topics and bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutableEvent {
    origin: EventOrigin,
    topic: String,
    body: String,
}

impl RoutableEvent {
    /// Returns `None` when either the topic or the body is blank.
    pub fn new(origin: EventOrigin, topic: String, body: String) -> Option<Self> {
        if topic.trim().is_empty() || body.trim().is_empty() {
            return None;
        }
        Some(Self {
            origin,
            topic,
            body,
        })
    }

    /// Where the event came from.
    pub fn origin(&self) -> &EventOrigin {
        &self.origin
    }

    /// Destination topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Rendered Markdown body.
    pub fn body(&self) -> &str {
        &self.body
    }
}

/// A single message on its way to the chat server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTask {
    /// Destination topic
    pub topic: String,
    /// Markdown body
    pub body: String,
    /// Number of send attempts made so far
    pub attempt: u32,
    /// When the task was created
    pub first_enqueued_at: DateTime<Utc>,
}

impl DeliveryTask {
    /// A fresh task with no attempts made.
    pub fn new(topic: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            body: body.into(),
            attempt: 0,
            first_enqueued_at: Utc::now(),
        }
    }
}

impl From<RoutableEvent> for DeliveryTask {
    fn from(event: RoutableEvent) -> Self {
        Self::new(event.topic, event.body)
    }
}
