//! Zulip REST client.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::{self, HeaderMap};
use reqwest::{Client as ReqwestClient, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::domain::errors::DeliveryError;
use crate::domain::models::{DeliveryTask, ZulipConfig};
use crate::domain::ports::Deliverer;

/// Body of every Zulip REST response
#[derive(Debug, Default, Deserialize)]
struct ApiResponse {
    result: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    code: Option<String>,
    /// Seconds until the rate limit resets, on `RATE_LIMIT_HIT`
    #[serde(rename = "retry-after", default)]
    retry_after: Option<f64>,
}

/// HTTP client for the Zulip messages API
///
/// Sends stream messages as the configured bot account. Every send first waits
/// on a rate limiter shared by all callers, since the server enforces one
/// limit per account.
pub struct ZulipClient {
    http_client: ReqwestClient,
    site: String,
    email: String,
    api_key: String,
    stream: String,
    limiter: DefaultDirectRateLimiter,
}

impl ZulipClient {
    /// Build a client from the `zulip` configuration section.
    pub fn new(config: &ZulipConfig) -> anyhow::Result<Self> {
        let api_key_scrubbed = match config.api_key.get(..4) {
            Some(prefix) if config.api_key.len() > 4 => format!("{prefix}...[REDACTED]"),
            _ => "[REDACTED]".to_string(),
        };

        info!(
            site = %config.site,
            email = %config.email,
            stream = %config.stream,
            requests_per_second = config.requests_per_second,
            api_key = %api_key_scrubbed,
            "Initializing Zulip client"
        );

        let http_client = ReqwestClient::builder()
            .pool_max_idle_per_host(4)
            .timeout(Duration::from_secs(config.timeout_secs))
            .tcp_nodelay(true)
            .user_agent(concat!("mercourier/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build Zulip HTTP client")?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http_client,
            site: config.site.trim_end_matches('/').to_string(),
            email: config.email.clone(),
            api_key: config.api_key.clone(),
            stream: config.stream.clone(),
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    /// Check the bot credentials with `GET /api/v1/users/me`.
    #[instrument(skip(self), fields(site = %self.site))]
    pub async fn verify_credentials(&self) -> Result<(), DeliveryError> {
        let response = self
            .http_client
            .get(format!("{}/api/v1/users/me", self.site))
            .basic_auth(&self.email, Some(&self.api_key))
            .send()
            .await
            .map_err(map_transport_error)?;

        handle_response(response).await?;
        debug!("Zulip credentials accepted");
        Ok(())
    }
}

#[async_trait]
impl Deliverer for ZulipClient {
    #[instrument(skip_all, fields(topic = %task.topic))]
    async fn send(&self, task: &DeliveryTask) -> Result<(), DeliveryError> {
        self.limiter.until_ready().await;

        let form = [
            ("type", "stream"),
            ("to", self.stream.as_str()),
            ("topic", task.topic.as_str()),
            ("content", task.body.as_str()),
        ];
        let response = self
            .http_client
            .post(format!("{}/api/v1/messages", self.site))
            .basic_auth(&self.email, Some(&self.api_key))
            .form(&form)
            .send()
            .await
            .map_err(map_transport_error)?;

        handle_response(response).await
    }

    fn name(&self) -> &'static str {
        "zulip"
    }
}

fn map_transport_error(error: reqwest::Error) -> DeliveryError {
    if error.is_timeout() {
        DeliveryError::Timeout
    } else {
        DeliveryError::Network(error.to_string())
    }
}

async fn handle_response(response: Response) -> Result<(), DeliveryError> {
    let status = response.status();
    let header_hint = retry_after_header(response.headers());
    let body = response.text().await.map_err(map_transport_error)?;
    classify_response(status, header_hint, &body)
}

fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

fn classify_response(
    status: StatusCode,
    header_hint: Option<Duration>,
    body: &str,
) -> Result<(), DeliveryError> {
    let parsed: Option<ApiResponse> = serde_json::from_str(body).ok();

    if status.is_success() {
        match &parsed {
            Some(reply) if reply.result != "success" => {}
            _ => return Ok(()),
        }
    }

    let reply = parsed.unwrap_or_else(|| ApiResponse {
        msg: body.to_string(),
        ..ApiResponse::default()
    });

    if status == StatusCode::TOO_MANY_REQUESTS || reply.code.as_deref() == Some("RATE_LIMIT_HIT") {
        let body_hint = reply
            .retry_after
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
        return Err(DeliveryError::RateLimited {
            retry_after: body_hint.or(header_hint),
        });
    }

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DeliveryError::Unauthorized(reply.msg),
        status if status.is_server_error() => DeliveryError::Server {
            status: status.as_u16(),
            body: reply.msg,
        },
        _ => DeliveryError::BadRequest(reply.msg),
    })
}
