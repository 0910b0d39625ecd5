//! Event classification.
//!
//! Decides whether a GitHub event is routable and, if so, resolves the fields
//! its topic needs. Unsupported event types fall through to `None`; a supported
//! event with a malformed payload is dropped with a warning.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::models::{EventOrigin, EventType, RawEvent, RoutableEvent};
use crate::services::formatter::{self, branch_name};
use crate::services::router::{self, RouteKey};

/// A supported event whose payload lacks a field its topic needs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    /// A required payload field is absent or has the wrong type
    #[error("{event_type} {event_id} has no usable `{field}` in its payload")]
    MissingField {
        /// Feed type of the event
        event_type: String,
        /// Feed id of the event
        event_id: String,
        /// Name of the payload field
        field: &'static str,
    },
}

impl ClassifyError {
    fn missing(event: &RawEvent, field: &'static str) -> Self {
        Self::MissingField {
            event_type: event.event_type.to_string(),
            event_id: event.id.to_string(),
            field,
        }
    }
}

/// Resolve the route key of `event`.
///
/// Returns `Ok(None)` for event types outside the supported set.
pub fn resolve(event: &RawEvent) -> Result<Option<RouteKey>, ClassifyError> {
    let payload = &event.payload;
    let key = match &event.event_type {
        EventType::Push => {
            let git_ref = payload
                .get("ref")
                .and_then(Value::as_str)
                .filter(|git_ref| !git_ref.is_empty())
                .ok_or_else(|| ClassifyError::missing(event, "ref"))?;
            RouteKey::Push {
                branch: branch_name(git_ref).to_string(),
            }
        }
        EventType::Issues => RouteKey::Issue {
            number: number_of(payload.get("issue"))
                .ok_or_else(|| ClassifyError::missing(event, "issue.number"))?,
        },
        EventType::PullRequest => RouteKey::PullRequest {
            number: number_of(payload.get("pull_request"))
                .or_else(|| payload.get("number").and_then(Value::as_u64))
                .ok_or_else(|| ClassifyError::missing(event, "pull_request.number"))?,
        },
        EventType::IssueComment => {
            let issue = payload.get("issue");
            let number = number_of(issue)
                .ok_or_else(|| ClassifyError::missing(event, "issue.number"))?;
            if is_pull_request(issue) {
                RouteKey::PullRequestComment { number }
            } else {
                RouteKey::IssueComment { number }
            }
        }
        EventType::Other(_) => return Ok(None),
    };
    Ok(Some(key))
}

/// Classify, route and format one event.
///
/// Never fails: unsupported events and data errors both yield `None`, and
/// only the latter is logged above debug.
pub fn classify(event: &RawEvent) -> Option<RoutableEvent> {
    let key = match resolve(event) {
        Ok(Some(key)) => key,
        Ok(None) => {
            debug!(
                event_id = %event.id,
                event_type = %event.event_type,
                "Dropping unsupported event type"
            );
            return None;
        }
        Err(error) => {
            warn!(repo = event.repo_name(), %error, "Dropping malformed event");
            return None;
        }
    };

    let topic = router::route(event.repo_name(), &key);
    let body = formatter::format(event);
    let routable = RoutableEvent::new(EventOrigin::github(event), topic, body);
    if routable.is_none() {
        warn!(event_id = %event.id, "Dropping event with empty topic or body");
    }
    routable
}

fn number_of(value: Option<&Value>) -> Option<u64> {
    value?.get("number")?.as_u64()
}

/// GitHub marks an issue that is really a pull request with a non-null
/// `pull_request` object.
fn is_pull_request(issue: Option<&Value>) -> bool {
    issue
        .and_then(|issue| issue.get("pull_request"))
        .is_some_and(|pr| !pr.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, payload: Value) -> RawEvent {
        serde_json::from_value(json!({
            "id": "100",
            "type": event_type,
            "actor": {"login": "octocat"},
            "repo": {"name": "acme/widgets"},
            "created_at": "2024-05-01T12:00:00Z",
            "payload": payload
        }))
        .unwrap()
    }

    #[test]
    fn test_push_routes_to_branch() {
        let routable = classify(&event(
            "PushEvent",
            json!({"ref": "refs/heads/main", "commits": []}),
        ))
        .unwrap();
        assert_eq!(routable.topic(), "acme/widgets/push/main");
        assert!(!routable.body().is_empty());
    }

    #[test]
    fn test_issue_comment_routes_to_issue() {
        let routable = classify(&event(
            "IssueCommentEvent",
            json!({"issue": {"number": 42}, "comment": {"body": "hi"}}),
        ))
        .unwrap();
        assert_eq!(routable.topic(), "acme/widgets/issues/42");
    }

    #[test]
    fn test_pull_request_comment_routes_to_pr() {
        let routable = classify(&event(
            "IssueCommentEvent",
            json!({
                "issue": {"number": 7, "pull_request": {"url": "https://api.github.com/repos/acme/widgets/pulls/7"}},
                "comment": {"body": "lgtm"}
            }),
        ))
        .unwrap();
        assert_eq!(routable.topic(), "acme/widgets/pr/7");
    }

    #[test]
    fn test_null_pull_request_flag_is_an_issue() {
        let key = resolve(&event(
            "IssueCommentEvent",
            json!({"issue": {"number": 3, "pull_request": null}}),
        ))
        .unwrap();
        assert_eq!(key, Some(RouteKey::IssueComment { number: 3 }));
    }

    #[test]
    fn test_pull_request_number_falls_back_to_payload() {
        let key = resolve(&event("PullRequestEvent", json!({"action": "opened", "number": 9})))
            .unwrap();
        assert_eq!(key, Some(RouteKey::PullRequest { number: 9 }));
    }

    #[test]
    fn test_unsupported_type_is_dropped() {
        assert_eq!(resolve(&event("WatchEvent", json!({}))).unwrap(), None);
        assert!(classify(&event("ForkEvent", json!({}))).is_none());
    }

    #[test]
    fn test_malformed_payload_is_a_data_error() {
        let error = resolve(&event("IssuesEvent", json!({"action": "opened"}))).unwrap_err();
        assert_eq!(
            error,
            ClassifyError::MissingField {
                event_type: "IssuesEvent".to_string(),
                event_id: "100".to_string(),
                field: "issue.number",
            }
        );
        assert!(classify(&event("PushEvent", json!({}))).is_none());
    }
}
