//! Topic routing.
//!
//! Maps a resolved [`RouteKey`] to a topic string through a fixed table of
//! templates. Routing is pure and total: every key has exactly one template.

use std::fmt;

/// Everything a topic template needs, resolved from one event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteKey {
    /// Push to a branch
    Push {
        /// Branch name without `refs/heads/`
        branch: String,
    },
    /// Issue opened, closed or otherwise changed
    Issue {
        /// Issue number
        number: u64,
    },
    /// Pull request opened, closed or otherwise changed
    PullRequest {
        /// Pull request number
        number: u64,
    },
    /// Comment on an issue
    IssueComment {
        /// Issue number
        number: u64,
    },
    /// Comment on a pull request
    PullRequestComment {
        /// Pull request number
        number: u64,
    },
    /// Log record of this process
    Log {
        /// Level name, in any case
        level: String,
    },
}

impl RouteKey {
    /// Table key of this route.
    pub fn kind(&self) -> RouteKind {
        match self {
            Self::Push { .. } => RouteKind::Push,
            Self::Issue { .. } => RouteKind::Issue,
            Self::PullRequest { .. } => RouteKind::PullRequest,
            Self::IssueComment { .. } => RouteKind::IssueComment,
            Self::PullRequestComment { .. } => RouteKind::PullRequestComment,
            Self::Log { .. } => RouteKind::Log,
        }
    }
}

/// Discriminant of [`RouteKey`], used as the key of the route table.
///
/// Declaration order matches the rows of [`TOPIC_ROUTES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    /// [`RouteKey::Push`]
    Push,
    /// [`RouteKey::Issue`]
    Issue,
    /// [`RouteKey::PullRequest`]
    PullRequest,
    /// [`RouteKey::IssueComment`]
    IssueComment,
    /// [`RouteKey::PullRequestComment`]
    PullRequestComment,
    /// [`RouteKey::Log`]
    Log,
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Push => "push",
            Self::Issue => "issue",
            Self::PullRequest => "pull_request",
            Self::IssueComment => "issue_comment",
            Self::PullRequestComment => "pull_request_comment",
            Self::Log => "log",
        };
        f.write_str(name)
    }
}

/// One row of the route table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicRoute {
    /// Which keys the row applies to
    pub kind: RouteKind,
    /// Topic with `{repo}`, `{branch}`, `{number}` or `{level}` placeholders
    pub template: &'static str,
}

/// The route table, one row per [`RouteKind`] in declaration order.
pub static TOPIC_ROUTES: [TopicRoute; 6] = [
    TopicRoute {
        kind: RouteKind::Push,
        template: "{repo}/push/{branch}",
    },
    TopicRoute {
        kind: RouteKind::Issue,
        template: "{repo}/issues/{number}",
    },
    TopicRoute {
        kind: RouteKind::PullRequest,
        template: "{repo}/pr/{number}",
    },
    TopicRoute {
        kind: RouteKind::IssueComment,
        template: "{repo}/issues/{number}",
    },
    TopicRoute {
        kind: RouteKind::PullRequestComment,
        template: "{repo}/pr/{number}",
    },
    TopicRoute {
        kind: RouteKind::Log,
        template: "log/{level}",
    },
];

/// Template of the table row for `kind`.
pub fn template_for(kind: RouteKind) -> &'static str {
    TOPIC_ROUTES[kind as usize].template
}

/// Compute the destination topic for `key` in repository `repo`.
///
/// Log levels are upper-cased so that `warn` and `WARN` share a topic.
pub fn route(repo: &str, key: &RouteKey) -> String {
    let template = template_for(key.kind());
    match key {
        RouteKey::Push { branch } => template
            .replace("{repo}", repo)
            .replace("{branch}", branch),
        RouteKey::Issue { number }
        | RouteKey::PullRequest { number }
        | RouteKey::IssueComment { number }
        | RouteKey::PullRequestComment { number } => template
            .replace("{repo}", repo)
            .replace("{number}", &number.to_string()),
        RouteKey::Log { level } => template.replace("{level}", &level.to_uppercase()),
    }
}

/// Topic for a log record at `level`.
pub fn log_topic(level: &str) -> String {
    route(
        "",
        &RouteKey::Log {
            level: level.to_string(),
        },
    )
}
