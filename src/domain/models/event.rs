//! Events as fetched from the GitHub repository events feed.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a GitHub event.
///
/// GitHub hands ids out as decimal strings that grow over time. They are
/// compared numerically: a longer id is always newer, equal-length ids compare
/// lexically. Plain string comparison would put `"999"` after `"1000"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Wrap a feed id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as sent by the feed.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for EventId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for EventId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// GitHub event type, as carried in the `type` field of the feed.
///
/// Types the relay does not route are kept in `Other` so that an unfamiliar
/// event never fails deserialization of the whole feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// `PushEvent`
    Push,
    /// `IssuesEvent`
    Issues,
    /// `PullRequestEvent`
    PullRequest,
    /// `IssueCommentEvent`
    IssueComment,
    /// Any type the relay does not route
    Other(String),
}

impl EventType {
    /// Name of the type as it appears in the feed.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Push => "PushEvent",
            Self::Issues => "IssuesEvent",
            Self::PullRequest => "PullRequestEvent",
            Self::IssueComment => "IssueCommentEvent",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for EventType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "PushEvent" => Self::Push,
            "IssuesEvent" => Self::Issues,
            "PullRequestEvent" => Self::PullRequest,
            "IssueCommentEvent" => Self::IssueComment,
            _ => Self::Other(name),
        }
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        event_type.as_str().to_string()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User that triggered an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// GitHub username
    pub login: String,
}

/// Repository an event belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    /// `owner/name` slug
    pub name: String,
}

/// One entry of the repository events feed. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Feed id, increasing over time
    pub id: EventId,

    /// Value of the `type` field
    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Repository the event happened in
    pub repo: RepoRef,

    /// User that caused the event
    pub actor: Actor,

    /// When GitHub recorded the event
    pub created_at: DateTime<Utc>,

    /// Type-specific payload, left opaque until classification
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RawEvent {
    /// `owner/name` of the event's repository.
    pub fn repo_name(&self) -> &str {
        &self.repo.name
    }

    /// Login of the acting user.
    pub fn actor_login(&self) -> &str {
        &self.actor.login
    }
}
