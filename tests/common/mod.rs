//! Common test utilities for integration tests
//!
//! Event fixtures shaped like the GitHub repository events feed, plus
//! configuration builders pointed at a wiremock server.

#![allow(dead_code)]

use mercourier::domain::models::{GitHubConfig, RawEvent, RepositoryEntry, RetryConfig, ZulipConfig};
use serde_json::{json, Value};

pub const REPO: &str = "acme/widgets";

/// Retry policy config that keeps tests fast.
pub fn quick_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_backoff_ms: 10,
        max_backoff_ms: 50,
    }
}

pub fn github_config(api_url: &str) -> GitHubConfig {
    GitHubConfig {
        api_url: api_url.to_string(),
        token: Some("ghp_testtoken".to_string()),
        per_page: 30,
        timeout_secs: 5,
        retry: quick_retry(2),
        repositories: vec![RepositoryEntry::Slug(REPO.to_string())],
        ..GitHubConfig::default()
    }
}

pub fn zulip_config(site: &str) -> ZulipConfig {
    ZulipConfig {
        site: site.to_string(),
        email: "bot@acme.zulipchat.com".to_string(),
        api_key: "zulip-test-key".to_string(),
        stream: "github".to_string(),
        requests_per_second: 1000,
        timeout_secs: 5,
        retry: quick_retry(2),
    }
}

fn envelope(id: &str, event_type: &str, payload: Value) -> Value {
    json!({
        "id": id,
        "type": event_type,
        "actor": {"login": "octocat", "id": 583231},
        "repo": {"id": 1296269, "name": REPO},
        "created_at": "2024-05-01T12:00:00Z",
        "public": true,
        "payload": payload
    })
}

pub fn push_json(id: &str, branch: &str) -> Value {
    envelope(
        id,
        "PushEvent",
        json!({
            "ref": format!("refs/heads/{branch}"),
            "size": 1,
            "commits": [
                {"sha": "6dcb09b5b57875f334f61aebed695e2e4193db5e", "message": "Fix widget alignment (#12)"}
            ]
        }),
    )
}

pub fn issue_json(id: &str, number: u64, action: &str) -> Value {
    envelope(
        id,
        "IssuesEvent",
        json!({
            "action": action,
            "issue": {
                "number": number,
                "title": "Widget falls over",
                "html_url": format!("https://github.com/{REPO}/issues/{number}"),
                "created_at": "2024-05-01T11:00:00Z",
                "comments": 0,
                "labels": [{"name": "bug"}],
                "body": "It falls over when tilted."
            }
        }),
    )
}

pub fn issue_comment_json(id: &str, number: u64, on_pull_request: bool) -> Value {
    let pull_request = if on_pull_request {
        json!({"url": format!("https://api.github.com/repos/{REPO}/pulls/{number}")})
    } else {
        Value::Null
    };
    envelope(
        id,
        "IssueCommentEvent",
        json!({
            "action": "created",
            "issue": {
                "number": number,
                "title": "Widget falls over",
                "html_url": format!("https://github.com/{REPO}/issues/{number}"),
                "pull_request": pull_request
            },
            "comment": {
                "html_url": format!("https://github.com/{REPO}/issues/{number}#issuecomment-1"),
                "body": "Confirmed on main.",
                "created_at": "2024-05-01T12:00:00Z"
            }
        }),
    )
}

pub fn watch_json(id: &str) -> Value {
    envelope(id, "WatchEvent", json!({"action": "started"}))
}

pub fn event(value: Value) -> RawEvent {
    serde_json::from_value(value).expect("fixture should deserialize")
}
