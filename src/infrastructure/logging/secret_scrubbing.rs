//! Credential scrubbing for forwarded log records.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static GITHUB_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:gh[pousr]_[A-Za-z0-9]{20,}|github_pat_[A-Za-z0-9_]{20,})\b")
        .expect("static regex")
});

static BEARER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(bearer|basic)\s+[A-Za-z0-9\-_.=+/]+").expect("static regex"));

static KEY_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(["']?(?:api_key|apikey|token|secret|password)["']?\s*[:=]\s*)["']?[^"'\s,}&]+["']?"#,
    )
    .expect("static regex")
});

/// Removes credentials from text before it leaves the process.
///
/// Log records forwarded to Zulip end up in a chat stream that more people
/// can read than the host's log files.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretScrubber;

impl SecretScrubber {
    /// Create a scrubber.
    pub const fn new() -> Self {
        Self
    }

    /// Replace every credential in `message` with a placeholder.
    pub fn scrub(&self, message: &str) -> String {
        let scrubbed = GITHUB_TOKEN.replace_all(message, "[TOKEN_REDACTED]");
        let scrubbed = BEARER.replace_all(&scrubbed, |caps: &Captures| {
            format!("{} [TOKEN_REDACTED]", &caps[1])
        });
        let scrubbed = KEY_VALUE.replace_all(&scrubbed, |caps: &Captures| {
            format!("{}[REDACTED]", &caps[1])
        });
        scrubbed.into_owned()
    }
}
