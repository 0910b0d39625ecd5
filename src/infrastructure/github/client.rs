//! GitHub REST client.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::SourceError;
use crate::domain::models::{GitHubConfig, RawEvent};
use crate::domain::ports::{EventSource, FeedResponse, RateStatus};

const USER_AGENT: &str = "mercourier";
const API_VERSION: &str = "2022-11-28";

/// HTTP client for the GitHub repository events API
///
/// One client is shared by every repository poller. Repositories with their
/// own token in the configuration use it; the rest use the default token, or
/// no authentication at all.
pub struct GitHubClient {
    http_client: ReqwestClient,
    api_url: String,
    default_token: Option<String>,
    repo_tokens: HashMap<String, String>,
    per_page: u32,
}

impl GitHubClient {
    /// Build a client from the `github` configuration section.
    pub fn new(config: &GitHubConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let http_client = ReqwestClient::builder()
            .pool_max_idle_per_host(4)
            .timeout(Duration::from_secs(config.timeout_secs))
            .tcp_nodelay(true)
            .default_headers(headers)
            .build()
            .context("Failed to build GitHub HTTP client")?;

        let repo_tokens: HashMap<String, String> = config
            .repositories
            .iter()
            .filter_map(|repo| Some((repo.slug().to_string(), repo.token()?.to_string())))
            .collect();

        info!(
            api_url = %config.api_url,
            authenticated = config.token.is_some(),
            repo_tokens = repo_tokens.len(),
            timeout_secs = config.timeout_secs,
            "Initializing GitHub client"
        );

        Ok(Self {
            http_client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            default_token: config.token.clone().filter(|token| !token.is_empty()),
            repo_tokens,
            per_page: config.per_page,
        })
    }

    fn token_for(&self, slug: &str) -> Option<&str> {
        self.repo_tokens
            .get(slug)
            .map(String::as_str)
            .or(self.default_token.as_deref())
    }

    fn authorize(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Check every configured token against `GET /rate_limit`.
    ///
    /// Returns the quota reported for the default credentials.
    #[instrument(skip(self))]
    pub async fn verify_credentials(&self) -> Result<RateStatus, SourceError> {
        let mut extra: Vec<&str> = self
            .repo_tokens
            .values()
            .map(String::as_str)
            .filter(|token| Some(*token) != self.default_token.as_deref())
            .collect();
        extra.sort_unstable();
        extra.dedup();
        let tokens = std::iter::once(self.default_token.as_deref()).chain(extra.into_iter().map(Some));

        let mut default_rate = RateStatus::default();
        for (index, token) in tokens.enumerate() {
            let request = self.http_client.get(format!("{}/rate_limit", self.api_url));
            let response = Self::authorize(request, token)
                .send()
                .await
                .map_err(map_transport_error)?;
            let status = response.status();
            let rate = rate_status(response.headers());
            if !status.is_success() {
                let retry_after = retry_after(response.headers());
                let body = response.text().await.unwrap_or_default();
                return Err(classify_status("rate_limit", status, &rate, retry_after, &body));
            }
            if index == 0 {
                default_rate = rate;
            }
        }

        debug!(remaining = ?default_rate.remaining, "GitHub credentials accepted");
        Ok(default_rate)
    }

    async fn handle_response(
        &self,
        slug: &str,
        response: Response,
    ) -> Result<FeedResponse, SourceError> {
        let status = response.status();
        let rate = rate_status(response.headers());
        debug!(%status, remaining = ?rate.remaining, "GitHub response");

        if status == StatusCode::NOT_MODIFIED {
            return Ok(FeedResponse::NotModified { rate });
        }

        if !status.is_success() {
            let retry_after = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(slug, status, &rate, retry_after, &body));
        }

        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(map_transport_error)?;
        let events = parse_events(slug, &body)?;

        Ok(FeedResponse::Modified { events, etag, rate })
    }
}

#[async_trait]
impl EventSource for GitHubClient {
    #[instrument(skip(self, etag), fields(conditional = etag.is_some()))]
    async fn fetch_events(
        &self,
        slug: &str,
        etag: Option<&str>,
    ) -> Result<FeedResponse, SourceError> {
        let url = format!("{}/repos/{}/events", self.api_url, slug);
        let mut request = self
            .http_client
            .get(&url)
            .query(&[("per_page", self.per_page)]);
        if let Some(etag) = etag {
            request = request.header(header::IF_NONE_MATCH, etag);
        }

        let response = Self::authorize(request, self.token_for(slug))
            .send()
            .await
            .map_err(map_transport_error)?;

        self.handle_response(slug, response).await
    }
}

/// Decode the feed, skipping entries that do not look like events.
fn parse_events(slug: &str, body: &[u8]) -> Result<Vec<RawEvent>, SourceError> {
    let entries: Vec<Value> = serde_json::from_slice(body)
        .map_err(|e| SourceError::InvalidResponse(format!("{slug}: {e}")))?;

    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<RawEvent>(entry) {
            Ok(event) => Some(event),
            Err(error) => {
                warn!(repo = slug, %error, "Skipping malformed feed entry");
                None
            }
        })
        .collect())
}

fn map_transport_error(error: reqwest::Error) -> SourceError {
    if error.is_timeout() {
        SourceError::Timeout
    } else {
        SourceError::Network(error.to_string())
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn rate_status(headers: &HeaderMap) -> RateStatus {
    RateStatus {
        remaining: header_str(headers, "x-ratelimit-remaining").and_then(|v| v.parse().ok()),
        reset_at: header_str(headers, "x-ratelimit-reset")
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        poll_interval: header_str(headers, "x-poll-interval")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs),
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_str(headers, header::RETRY_AFTER.as_str())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// GitHub error bodies are `{"message": "..."}`; fall back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json.get("message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

fn classify_status(
    slug: &str,
    status: StatusCode,
    rate: &RateStatus,
    retry_after: Option<Duration>,
    body: &str,
) -> SourceError {
    let throttled = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && (rate.is_exhausted() || retry_after.is_some()));
    if throttled {
        // Secondary limits advertise a short Retry-After alongside the hourly reset.
        let reset_at = retry_after
            .and_then(|after| chrono::Duration::from_std(after).ok())
            .map(|after| Utc::now() + after)
            .or(rate.reset_at);
        return SourceError::RateLimited { reset_at };
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SourceError::BadCredentials(error_message(body))
        }
        StatusCode::NOT_FOUND => SourceError::NotFound(slug.to_string()),
        status if status.is_server_error() => SourceError::Server {
            status: status.as_u16(),
            body: error_message(body),
        },
        status => SourceError::Unexpected {
            status: status.as_u16(),
            body: error_message(body),
        },
    }
}
