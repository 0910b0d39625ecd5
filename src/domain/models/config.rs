//! Configuration schema with defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration structure for Mercourier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Event source (GitHub) configuration
    #[serde(default)]
    pub github: GitHubConfig,

    /// Chat server (Zulip) configuration
    #[serde(default)]
    pub zulip: ZulipConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Watermark persistence
    #[serde(default)]
    pub state: StateConfig,

    /// Grace period for in-flight work on shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

const fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Shutdown grace period as a `Duration`.
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// What to do with the feed the first time a repository is polled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstRunPolicy {
    /// Adopt the newest event as the watermark without emitting anything
    #[default]
    AdoptLatest,
    /// Emit every event still in the feed
    ReplayFeed,
}

/// GitHub polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GitHubConfig {
    /// REST API base URL
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Personal access token used for every repository without its own token
    #[serde(default)]
    pub token: Option<String>,

    /// Default seconds between polls of one repository
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// First-run policy for repositories without a stored watermark
    #[serde(default)]
    pub first_run: FirstRunPolicy,

    /// Events requested per feed page
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retry policy for one poll cycle
    #[serde(default)]
    pub retry: RetryConfig,

    /// Watched repositories
    #[serde(default)]
    pub repositories: Vec<RepositoryEntry>,
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

const fn default_poll_interval_secs() -> u64 {
    60 * 60 * 3
}

const fn default_per_page() -> u32 {
    100
}

const fn default_timeout_secs() -> u64 {
    30
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            token: None,
            poll_interval_secs: default_poll_interval_secs(),
            first_run: FirstRunPolicy::default(),
            per_page: default_per_page(),
            timeout_secs: default_timeout_secs(),
            retry: RetryConfig::default(),
            repositories: vec![],
        }
    }
}

/// A watched repository: either a bare `owner/name` slug or a table with overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RepositoryEntry {
    /// Bare `owner/name`
    Slug(String),
    /// Slug with overrides
    Detailed(RepositoryConfig),
}

/// Per-repository overrides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RepositoryConfig {
    /// `owner/name` of the repository
    pub slug: String,

    /// Poll interval for this repository, overriding `github.poll_interval_secs`
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,

    /// Token for this repository, overriding `github.token`
    #[serde(default)]
    pub token: Option<String>,
}

impl RepositoryEntry {
    /// `owner/name` of the repository.
    pub fn slug(&self) -> &str {
        match self {
            Self::Slug(slug) => slug,
            Self::Detailed(repo) => &repo.slug,
        }
    }

    /// Poll interval, falling back to `default_secs`.
    pub fn poll_interval_secs(&self, default_secs: u64) -> u64 {
        match self {
            Self::Slug(_) => default_secs,
            Self::Detailed(repo) => repo.poll_interval_secs.unwrap_or(default_secs),
        }
    }

    /// Repository-specific token, if any.
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Slug(_) => None,
            Self::Detailed(repo) => repo.token.as_deref(),
        }
    }
}

/// Zulip delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ZulipConfig {
    /// Organization URL, e.g. `https://acme.zulipchat.com`
    #[serde(default)]
    pub site: String,

    /// Bot account email
    #[serde(default)]
    pub email: String,

    /// Bot account API key
    #[serde(default)]
    pub api_key: String,

    /// Channel (stream) all topics live in
    #[serde(default = "default_stream")]
    pub stream: String,

    /// Messages per second shared by every sender
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retry policy for one message
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_stream() -> String {
    "github".to_string()
}

const fn default_requests_per_second() -> u32 {
    2
}

impl Default for ZulipConfig {
    fn default() -> Self {
        Self {
            site: String::new(),
            email: String::new(),
            api_key: String::new(),
            stream: default_stream(),
            requests_per_second: default_requests_per_second(),
            timeout_secs: default_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human-readable lines
    #[default]
    Pretty,
}

/// Log file rotation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    /// New file every day
    #[default]
    Daily,
    /// New file every hour
    Hourly,
    /// Single file
    Never,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Console format: json or pretty
    #[serde(default)]
    pub format: LogFormat,

    /// Directory for JSON log files (console only when absent)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Log file rotation policy
    #[serde(default)]
    pub rotation: RotationPolicy,

    /// Lowest level forwarded to the `log/{LEVEL}` chat topics
    #[serde(default = "default_log_level")]
    pub forward_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            rotation: RotationPolicy::default(),
            forward_level: default_log_level(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    2000
}

const fn default_max_backoff_ms() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Watermark persistence configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StateConfig {
    /// JSON file holding etag and watermark per repository (in-memory when absent)
    #[serde(default)]
    pub path: Option<PathBuf>,
}
