mod common;

use std::time::Duration;

use mercourier::domain::errors::SourceError;
use mercourier::domain::ports::{EventSource, FeedResponse};
use mercourier::infrastructure::github::GitHubClient;
use mercourier::domain::models::{RepositoryConfig, RepositoryEntry};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{github_config, issue_json, push_json, REPO};

#[tokio::test]
async fn test_fetch_sends_headers_and_parses_feed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("/repos/{REPO}/events")))
        .and(query_param("per_page", "30"))
        .and(header("accept", "application/vnd.github+json"))
        .and(header("x-github-api-version", "2022-11-28"))
        .and(header("authorization", "Bearer ghp_testtoken"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "W/\"feed-1\"")
                .insert_header("x-ratelimit-remaining", "4999")
                .insert_header("x-poll-interval", "60")
                .set_body_json(json!([push_json("102", "main"), issue_json("101", 7, "opened")])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = GitHubClient::new(&github_config(&mock_server.uri())).unwrap();
    let response = client.fetch_events(REPO, None).await.unwrap();

    match response {
        FeedResponse::Modified { events, etag, rate } => {
            assert_eq!(events.len(), 2);
            assert_eq!(events[0].id.as_str(), "102");
            assert_eq!(etag.as_deref(), Some("W/\"feed-1\""));
            assert_eq!(rate.remaining, Some(4999));
            assert_eq!(rate.poll_interval, Some(Duration::from_secs(60)));
        }
        other => panic!("expected a modified feed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_conditional_request_not_modified() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("/repos/{REPO}/events")))
        .and(header("if-none-match", "W/\"feed-1\""))
        .respond_with(ResponseTemplate::new(304).insert_header("x-ratelimit-remaining", "4998"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = GitHubClient::new(&github_config(&mock_server.uri())).unwrap();
    let response = client
        .fetch_events(REPO, Some("W/\"feed-1\""))
        .await
        .unwrap();

    assert!(matches!(response, FeedResponse::NotModified { .. }));
    assert_eq!(response.rate().remaining, Some(4998));
}

#[tokio::test]
async fn test_exhausted_quota_is_rate_limited() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("/repos/{REPO}/events")))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", "1714564800")
                .set_body_json(json!({"message": "API rate limit exceeded"})),
        )
        .mount(&mock_server)
        .await;

    let client = GitHubClient::new(&github_config(&mock_server.uri())).unwrap();
    let error = client.fetch_events(REPO, None).await.unwrap_err();

    match error {
        SourceError::RateLimited { reset_at } => {
            assert_eq!(reset_at.unwrap().timestamp(), 1_714_564_800);
        }
        other => panic!("expected rate limit, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_repository_is_permanent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/gone/events"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .mount(&mock_server)
        .await;

    let client = GitHubClient::new(&github_config(&mock_server.uri())).unwrap();
    let error = client.fetch_events("acme/gone", None).await.unwrap_err();

    assert!(matches!(error, SourceError::NotFound(ref slug) if slug == "acme/gone"));
    assert!(error.is_permanent());
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("/repos/{REPO}/events")))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&mock_server)
        .await;

    let client = GitHubClient::new(&github_config(&mock_server.uri())).unwrap();
    let error = client.fetch_events(REPO, None).await.unwrap_err();

    assert!(matches!(error, SourceError::Server { status: 502, .. }));
    assert!(error.is_transient());
}

#[tokio::test]
async fn test_per_repository_token_overrides_default() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/private/events"))
        .and(header("authorization", "Bearer ghp_private"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = github_config(&mock_server.uri());
    config.repositories.push(RepositoryEntry::Detailed(RepositoryConfig {
        slug: "acme/private".to_string(),
        poll_interval_secs: None,
        token: Some("ghp_private".to_string()),
    }));

    let client = GitHubClient::new(&config).unwrap();
    let response = client.fetch_events("acme/private", None).await.unwrap();
    assert!(matches!(response, FeedResponse::Modified { ref events, .. } if events.is_empty()));
}

#[tokio::test]
async fn test_verify_credentials() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rate_limit"))
        .and(header("authorization", "Bearer ghp_testtoken"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-remaining", "4321")
                .set_body_json(json!({"resources": {}})),
        )
        .mount(&mock_server)
        .await;

    let client = GitHubClient::new(&github_config(&mock_server.uri())).unwrap();
    let rate = client.verify_credentials().await.unwrap();
    assert_eq!(rate.remaining, Some(4321));
}

#[tokio::test]
async fn test_verify_credentials_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rate_limit"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})))
        .mount(&mock_server)
        .await;

    let client = GitHubClient::new(&github_config(&mock_server.uri())).unwrap();
    let error = client.verify_credentials().await.unwrap_err();
    assert!(matches!(error, SourceError::BadCredentials(ref message) if message == "Bad credentials"));
}
