//! Message bodies for GitHub events.
//!
//! Every function here is pure: the same event always renders to the same
//! Markdown. Absent optional fields are omitted or shown as `Unknown`; nothing
//! in this module fails.

use std::fmt::Write as _;
use std::sync::LazyLock;

use chrono::DateTime;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::domain::models::{EventType, RawEvent};

/// Zulip rejects message bodies longer than this many characters.
pub const MAX_BODY_CHARS: usize = 10_000;

const TRUNCATION_MARKER: &str = "\n\n*[message truncated]*";

const UNKNOWN: &str = "Unknown";

static ISSUE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#(\d+)\b").expect("issue number pattern"));

static PR_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(#(\d+)\)").expect("pull request suffix pattern"));

static HTML_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("html comment pattern"));

/// Render the message body for `event`.
pub fn format(event: &RawEvent) -> String {
    let body = match &event.event_type {
        EventType::Push => format_push(event),
        EventType::Issues => format_issue(event),
        EventType::PullRequest => format_pull_request(event),
        EventType::IssueComment => format_comment(event),
        EventType::Other(name) => format_other(event, name),
    };
    truncate_body(body)
}

fn format_push(event: &RawEvent) -> String {
    let payload = &event.payload;
    let repo = event.repo_name();
    let branch = payload
        .get("ref")
        .and_then(Value::as_str)
        .map_or(UNKNOWN, branch_name);
    let commits = payload
        .get("commits")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let count = if commits.is_empty() {
        payload.get("size").and_then(Value::as_u64).unwrap_or(0)
    } else {
        commits.len() as u64
    };
    let pushed_at = format_timestamp(&event.created_at.to_rfc3339());

    let mut out = format!(
        "{} pushed {} {} to `{}`\n\n",
        user_link(event.actor_login()),
        count,
        if count == 1 { "commit" } else { "commits" },
        branch
    );

    if commits.is_empty() {
        out.push_str("No commits found in push event.\n");
    }
    for commit in commits {
        let message = commit
            .get("message")
            .and_then(Value::as_str)
            .and_then(|message| message.lines().next())
            .unwrap_or("No message");
        let sha = commit
            .get("sha")
            .or_else(|| commit.get("id"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let short_sha: String = sha.chars().take(7).collect();
        let _ = writeln!(
            out,
            "- {} ([`{}`](https://github.com/{}/commit/{})) at {}",
            link_pull_request_suffix(message, repo),
            short_sha,
            repo,
            sha,
            pushed_at
        );
    }

    if flag(payload, "forced") {
        out.push_str("\n⚠️ This was a force push!\n");
    }
    if flag(payload, "created") {
        let _ = write!(out, "\n🆕 Branch `{branch}` was created\n");
    }
    if flag(payload, "deleted") {
        let _ = write!(out, "\n❌ Branch `{branch}` was deleted\n");
    }

    out
}

fn format_issue(event: &RawEvent) -> String {
    let payload = &event.payload;
    let issue = payload.get("issue").unwrap_or(&Value::Null);
    let action = str_field(payload, "action").unwrap_or(UNKNOWN);
    let number = number_label(issue);

    let mut out = format!(
        "[Issue #{}]({}) {} by {} at {}\n\n",
        number,
        str_field(issue, "html_url").unwrap_or_default(),
        action,
        user_link(event.actor_login()),
        timestamp_field(issue, "created_at")
    );

    out.push_str(&table_header(str_field(issue, "title").unwrap_or("No title")));
    if let Some(labels) = label_names(issue) {
        let _ = writeln!(out, "| Labels | {labels} |");
    }
    if let Some(comments) = issue.get("comments").and_then(Value::as_u64).filter(|n| *n > 0) {
        let _ = writeln!(out, "| Comments | {comments} |");
    }
    if action == "closed" {
        if issue.get("closed_at").and_then(Value::as_str).is_some() {
            let _ = writeln!(out, "| Closed at | {} |", timestamp_field(issue, "closed_at"));
        }
        if let Some(reason) = str_field(issue, "state_reason") {
            let _ = writeln!(out, "| Reason | {reason} |");
        }
    }

    if action == "opened" {
        if let Some(body) = non_empty_body(issue) {
            let _ = write!(out, "\n{body}\n");
        }
    }

    out
}

fn format_pull_request(event: &RawEvent) -> String {
    let payload = &event.payload;
    let pr = payload.get("pull_request").unwrap_or(&Value::Null);
    let action = match str_field(payload, "action") {
        Some("closed") if flag(pr, "merged") => "merged",
        Some(action) => action,
        None => UNKNOWN,
    };
    let number = pr
        .get("number")
        .or_else(|| payload.get("number"))
        .and_then(Value::as_u64)
        .map_or_else(|| UNKNOWN.to_string(), |n| n.to_string());

    let mut out = format!(
        "[PR #{}]({}) {} by {} at {}\n\n",
        number,
        str_field(pr, "html_url").unwrap_or_default(),
        action,
        user_link(event.actor_login()),
        timestamp_field(pr, "created_at")
    );

    out.push_str(&table_header(str_field(pr, "title").unwrap_or("No title")));
    let _ = writeln!(
        out,
        "| Changes | +{} / -{} in {} files |",
        u64_field(pr, "additions"),
        u64_field(pr, "deletions"),
        u64_field(pr, "changed_files")
    );
    let _ = writeln!(out, "| Updated | {} |", timestamp_field(pr, "updated_at"));
    if let Some(labels) = label_names(pr) {
        let _ = writeln!(out, "| Labels | {labels} |");
    }

    if action == "opened" {
        if let Some(body) = non_empty_body(pr) {
            let body = remove_html_comments(body);
            let body = rewrite_issue_numbers(body.trim(), event.repo_name());
            if !body.is_empty() {
                let _ = write!(out, "\n{}\n", escape_table_pipes(&body));
            }
        }
    }

    out
}

fn format_comment(event: &RawEvent) -> String {
    let payload = &event.payload;
    let comment = payload.get("comment").unwrap_or(&Value::Null);
    let issue = payload.get("issue").unwrap_or(&Value::Null);

    let url = str_field(comment, "html_url")
        .or_else(|| str_field(issue, "html_url"))
        .map_or_else(
            || {
                format!(
                    "https://github.com/{}/issues/{}",
                    event.repo_name(),
                    number_label(issue)
                )
            },
            str::to_string,
        );

    let mut out = format!(
        "💬 New comment on [{}]({}) by {} at {}\n",
        str_field(issue, "title").unwrap_or("No title"),
        url,
        user_link(event.actor_login()),
        timestamp_field(comment, "created_at")
    );

    if let Some(body) = non_empty_body(comment) {
        let _ = write!(out, "\n{body}\n");
    }

    out
}

fn format_other(event: &RawEvent, name: &str) -> String {
    format!(
        "{} triggered `{}` on [{}](https://github.com/{})\n",
        user_link(event.actor_login()),
        name,
        event.repo_name(),
        event.repo_name()
    )
}

/// Branch or tag name of a git ref (`refs/heads/main` becomes `main`).
pub fn branch_name(git_ref: &str) -> &str {
    git_ref
        .strip_prefix("refs/heads/")
        .or_else(|| git_ref.strip_prefix("refs/tags/"))
        .unwrap_or(git_ref)
}

/// Rewrite `#N` references as links to issue N of `repo`.
pub fn rewrite_issue_numbers(body: &str, repo: &str) -> String {
    ISSUE_NUMBER
        .replace_all(body, |caps: &Captures| {
            format!("[#{0}](https://github.com/{1}/issues/{0})", &caps[1], repo)
        })
        .into_owned()
}

/// Rewrite a trailing `(#N)` in a commit subject as a pull request link.
pub fn link_pull_request_suffix(subject: &str, repo: &str) -> String {
    PR_SUFFIX
        .replace_all(subject, |caps: &Captures| {
            format!("([#{0}](https://github.com/{1}/pull/{0}))", &caps[1], repo)
        })
        .into_owned()
}

/// Strip `<!-- ... -->` blocks, typically left over from PR templates.
pub fn remove_html_comments(body: &str) -> String {
    HTML_COMMENT.replace_all(body, "").into_owned()
}

/// Escape `|` so that text can sit next to a Markdown table.
pub fn escape_table_pipes(text: &str) -> String {
    text.replace('|', "\\|")
}

/// Render an RFC 3339 timestamp as `YYYY-mm-dd HH:MM:SS`, or `Unknown`.
pub fn format_timestamp(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw).map_or_else(
        |_| UNKNOWN.to_string(),
        |at| at.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

/// Cap `body` at [`MAX_BODY_CHARS`] characters, marking the cut.
pub fn truncate_body(body: String) -> String {
    if body.chars().count() <= MAX_BODY_CHARS {
        return body;
    }
    let keep = MAX_BODY_CHARS - TRUNCATION_MARKER.chars().count();
    let mut truncated: String = body.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

fn user_link(login: &str) -> String {
    format!("[{login}](https://github.com/{login})")
}

fn table_header(title: &str) -> String {
    format!(
        "| **Title** | {} |\n| --- | --- |\n",
        escape_table_pipes(title)
    )
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn u64_field(value: &Value, key: &str) -> u64 {
    value.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn flag(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn number_label(value: &Value) -> String {
    value
        .get("number")
        .and_then(Value::as_u64)
        .map_or_else(|| UNKNOWN.to_string(), |n| n.to_string())
}

fn timestamp_field(value: &Value, key: &str) -> String {
    str_field(value, key).map_or_else(|| UNKNOWN.to_string(), format_timestamp)
}

fn non_empty_body(value: &Value) -> Option<&str> {
    str_field(value, "body")
        .map(str::trim)
        .filter(|body| !body.is_empty())
}

fn label_names(value: &Value) -> Option<String> {
    let names: Vec<&str> = value
        .get("labels")?
        .as_array()?
        .iter()
        .filter_map(|label| label.get("name").and_then(Value::as_str))
        .filter(|name| !name.is_empty())
        .collect();
    (!names.is_empty()).then(|| names.join(", "))
}
