//! Configuration loading and validation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::{Config, RetryConfig};

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "mercourier.yaml";

/// Prefix of environment variable overrides (`MERCOURIER_ZULIP__API_KEY`)
pub const ENV_PREFIX: &str = "MERCOURIER_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration error types
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration file does not exist
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// `github.repositories` is empty
    #[error("No repositories configured under github.repositories")]
    NoRepositories,

    /// A repository entry is not `owner/name`
    #[error("Invalid repository slug: {0:?}. Must be owner/name")]
    InvalidRepositorySlug(String),

    /// The same slug appears twice
    #[error("Repository listed twice: {0}")]
    DuplicateRepository(String),

    /// A poll interval of zero
    #[error("Invalid poll interval for {0}: {1}s. Must be at least 1 second")]
    InvalidPollInterval(String, u64),

    /// `github.per_page` outside 1..=100
    #[error("Invalid github.per_page: {0}. Must be between 1 and 100")]
    InvalidPerPage(u32),

    /// A retry section allows no retries
    #[error("Invalid {0}.max_retries: 0. Must be at least 1")]
    InvalidMaxRetries(&'static str),

    /// A retry section whose initial backoff is not below its maximum
    #[error(
        "Invalid {0}.retry: initial_backoff_ms ({1}) must be less than max_backoff_ms ({2})"
    )]
    InvalidBackoff(&'static str, u64, u64),

    /// Unknown level name
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// A Zulip setting is blank while delivery to Zulip is on
    #[error("Missing zulip.{0}, required unless --zulip-off is given")]
    MissingZulipSetting(&'static str),

    /// `zulip.requests_per_second` is zero
    #[error("Invalid zulip.requests_per_second: 0. Must be at least 1")]
    InvalidRequestsPerSecond,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from `path`
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. The YAML file at `path`
    /// 3. Environment variables (`MERCOURIER_*`, nested with `__`)
    ///
    /// The result is not validated; call [`ConfigLoader::validate`] once the
    /// delivery mode is known.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()).into());
        }

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Zulip credentials are only required when `zulip_enabled` is set.
    pub fn validate(config: &Config, zulip_enabled: bool) -> Result<(), ConfigError> {
        let github = &config.github;

        if github.repositories.is_empty() {
            return Err(ConfigError::NoRepositories);
        }

        let mut seen = HashSet::new();
        for repo in &github.repositories {
            let slug = repo.slug();
            if !is_valid_slug(slug) {
                return Err(ConfigError::InvalidRepositorySlug(slug.to_string()));
            }
            if !seen.insert(slug) {
                return Err(ConfigError::DuplicateRepository(slug.to_string()));
            }
            let interval = repo.poll_interval_secs(github.poll_interval_secs);
            if interval == 0 {
                return Err(ConfigError::InvalidPollInterval(slug.to_string(), interval));
            }
        }

        if github.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidPollInterval(
                "github".to_string(),
                github.poll_interval_secs,
            ));
        }

        if !(1..=100).contains(&github.per_page) {
            return Err(ConfigError::InvalidPerPage(github.per_page));
        }

        validate_retry("github", &github.retry)?;
        validate_retry("zulip", &config.zulip.retry)?;

        for level in [&config.logging.level, &config.logging.forward_level] {
            if !VALID_LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
                return Err(ConfigError::InvalidLogLevel(level.clone()));
            }
        }

        if zulip_enabled {
            let zulip = &config.zulip;
            let required = [
                ("site", &zulip.site),
                ("email", &zulip.email),
                ("api_key", &zulip.api_key),
                ("stream", &zulip.stream),
            ];
            for (name, value) in required {
                if value.trim().is_empty() {
                    return Err(ConfigError::MissingZulipSetting(name));
                }
            }
            if zulip.requests_per_second == 0 {
                return Err(ConfigError::InvalidRequestsPerSecond);
            }
        }

        Ok(())
    }
}

fn validate_retry(section: &'static str, retry: &RetryConfig) -> Result<(), ConfigError> {
    if retry.max_retries == 0 {
        return Err(ConfigError::InvalidMaxRetries(section));
    }
    if retry.initial_backoff_ms >= retry.max_backoff_ms {
        return Err(ConfigError::InvalidBackoff(
            section,
            retry.initial_backoff_ms,
            retry.max_backoff_ms,
        ));
    }
    Ok(())
}

/// `owner/name`, both parts non-empty and free of whitespace.
fn is_valid_slug(slug: &str) -> bool {
    match slug.split_once('/') {
        Some((owner, name)) => {
            !owner.is_empty()
                && !name.is_empty()
                && !name.contains('/')
                && !slug.chars().any(char::is_whitespace)
        }
        None => false,
    }
}
