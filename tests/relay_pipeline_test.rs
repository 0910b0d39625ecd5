//! End-to-end poll cycles against mocked GitHub and Zulip servers.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mercourier::domain::models::{FirstRunPolicy, RepoWatch};
use mercourier::domain::ports::EventHandoff;
use mercourier::infrastructure::github::GitHubClient;
use mercourier::infrastructure::retry::RetryPolicy;
use mercourier::infrastructure::zulip::ZulipClient;
use mercourier::services::{CycleOutcome, DeliveryEngine, Pipeline, RepositoryPoller};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{
    github_config, issue_comment_json, issue_json, push_json, quick_retry, watch_json,
    zulip_config, REPO,
};

/// Collects the messages of every ERROR record.
#[derive(Clone, Default)]
struct ErrorLog {
    messages: Arc<Mutex<Vec<String>>>,
}

struct MessageVisitor<'a>(&'a mut String);

impl Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for ErrorLog {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::ERROR {
            let mut message = String::new();
            event.record(&mut MessageVisitor(&mut message));
            self.messages.lock().unwrap().push(message);
        }
    }
}

struct Harness {
    github: MockServer,
    zulip: MockServer,
}

impl Harness {
    async fn start() -> Self {
        Self {
            github: MockServer::start().await,
            zulip: MockServer::start().await,
        }
    }

    fn poller(&self, first_run: FirstRunPolicy) -> RepositoryPoller {
        let client = GitHubClient::new(&github_config(&self.github.uri())).unwrap();
        RepositoryPoller::new(Arc::new(client), RetryPolicy::new(1, 10, 20), first_run)
    }

    fn pipeline(&self, max_retries: u32) -> Pipeline {
        let client = ZulipClient::new(&zulip_config(&self.zulip.uri())).unwrap();
        let engine = DeliveryEngine::new(
            Arc::new(client),
            RetryPolicy::from_config(&quick_retry(max_retries)),
        );
        Pipeline::new(Arc::new(engine))
    }

    async fn zulip_topics(&self) -> Vec<String> {
        self.zulip
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|request| {
                let body = String::from_utf8_lossy(&request.body).into_owned();
                body.split('&')
                    .find_map(|pair| pair.strip_prefix("topic=").map(str::to_string))
            })
            .collect()
    }
}

async fn zulip_accepts(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "success",
            "msg": "",
            "id": 1
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_replayed_feed_lands_in_expected_topics() {
    let harness = Harness::start().await;
    zulip_accepts(&harness.zulip).await;

    Mock::given(method("GET"))
        .and(path(format!("/repos/{REPO}/events")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"feed-1\"")
                .set_body_json(json!([
                    issue_comment_json("105", 9, true),
                    issue_comment_json("104", 7, false),
                    watch_json("103"),
                    issue_json("102", 7, "opened"),
                    push_json("101", "main"),
                ])),
        )
        .mount(&harness.github)
        .await;

    let poller = harness.poller(FirstRunPolicy::ReplayFeed);
    let pipeline = harness.pipeline(2);
    let mut watch = RepoWatch::new(REPO, Duration::from_secs(60));

    let outcome = poller
        .run_cycle(&mut watch, &pipeline, &CancellationToken::new())
        .await;

    assert!(matches!(outcome, CycleOutcome::Processed { handed_off: 5 }));
    assert_eq!(watch.last_seen_event_id().unwrap().as_str(), "105");
    assert_eq!(watch.etag(), Some("\"feed-1\""));
    assert_eq!(
        harness.zulip_topics().await,
        vec![
            "acme%2Fwidgets%2Fpush%2Fmain",
            "acme%2Fwidgets%2Fissues%2F7",
            "acme%2Fwidgets%2Fissues%2F7",
            "acme%2Fwidgets%2Fpr%2F9",
        ]
    );
}

#[tokio::test]
async fn test_second_cycle_is_conditional_and_emits_nothing() {
    let harness = Harness::start().await;
    zulip_accepts(&harness.zulip).await;

    Mock::given(method("GET"))
        .and(path(format!("/repos/{REPO}/events")))
        .and(header("if-none-match", "\"feed-1\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&harness.github)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/repos/{REPO}/events")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"feed-1\"")
                .set_body_json(json!([push_json("101", "main")])),
        )
        .up_to_n_times(1)
        .mount(&harness.github)
        .await;

    let poller = harness.poller(FirstRunPolicy::ReplayFeed);
    let pipeline = harness.pipeline(2);
    let mut watch = RepoWatch::new(REPO, Duration::from_secs(60));
    let cancel = CancellationToken::new();

    let first = poller.run_cycle(&mut watch, &pipeline, &cancel).await;
    let second = poller.run_cycle(&mut watch, &pipeline, &cancel).await;

    assert!(matches!(first, CycleOutcome::Processed { handed_off: 1 }));
    assert!(matches!(second, CycleOutcome::NotModified));
    assert_eq!(harness.zulip_topics().await.len(), 1);
}

#[tokio::test]
async fn test_adopt_latest_sends_nothing_on_first_poll() {
    let harness = Harness::start().await;
    zulip_accepts(&harness.zulip).await;

    Mock::given(method("GET"))
        .and(path(format!("/repos/{REPO}/events")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([issue_json("102", 7, "opened"), push_json("101", "main")])),
        )
        .mount(&harness.github)
        .await;

    let poller = harness.poller(FirstRunPolicy::AdoptLatest);
    let pipeline = harness.pipeline(2);
    let mut watch = RepoWatch::new(REPO, Duration::from_secs(60));

    let outcome = poller
        .run_cycle(&mut watch, &pipeline, &CancellationToken::new())
        .await;

    assert!(matches!(outcome, CycleOutcome::Primed { .. }));
    assert_eq!(watch.last_seen_event_id().unwrap().as_str(), "102");
    assert!(harness.zulip_topics().await.is_empty());
}

#[tokio::test]
async fn test_exhausted_delivery_logs_one_error_and_moves_on() {
    let harness = Harness::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/messages"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .expect(3)
        .mount(&harness.zulip)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/repos/{REPO}/events")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([push_json("101", "main")])))
        .mount(&harness.github)
        .await;

    let errors = ErrorLog::default();
    let subscriber = tracing_subscriber::registry().with(errors.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let poller = harness.poller(FirstRunPolicy::ReplayFeed);
    let pipeline = harness.pipeline(2);
    let mut watch = RepoWatch::new(REPO, Duration::from_secs(60));

    let outcome = poller
        .run_cycle(&mut watch, &pipeline, &CancellationToken::new())
        .await;

    // The failed event still counts as dispatched.
    assert!(matches!(outcome, CycleOutcome::Processed { handed_off: 1 }));
    assert_eq!(watch.last_seen_event_id().unwrap().as_str(), "101");
    assert_eq!(
        *errors.messages.lock().unwrap(),
        vec!["Delivery abandoned".to_string()]
    );
}

#[tokio::test]
async fn test_rate_limit_pauses_only_the_limited_repository() {
    let harness = Harness::start().await;
    zulip_accepts(&harness.zulip).await;

    let reset = chrono::Utc::now().timestamp() + 120;
    Mock::given(method("GET"))
        .and(path(format!("/repos/{REPO}/events")))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", reset.to_string().as_str())
                .set_body_json(json!({"message": "API rate limit exceeded"})),
        )
        .expect(1)
        .mount(&harness.github)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/gears/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([push_json("201", "main")])))
        .mount(&harness.github)
        .await;

    let poller = harness.poller(FirstRunPolicy::ReplayFeed);
    let pipeline = harness.pipeline(2);
    let cancel = CancellationToken::new();
    let mut limited = RepoWatch::new(REPO, Duration::from_secs(60));
    let mut healthy = RepoWatch::new("acme/gears", Duration::from_secs(60));

    let first = poller.run_cycle(&mut limited, &pipeline, &cancel).await;
    let second = poller.run_cycle(&mut limited, &pipeline, &cancel).await;
    let other = poller.run_cycle(&mut healthy, &pipeline, &cancel).await;

    match first {
        CycleOutcome::RateLimited { cooldown } => {
            assert!(cooldown > Duration::from_secs(60));
            assert!(cooldown <= Duration::from_secs(121));
        }
        other => panic!("expected rate limit, got {other:?}"),
    }
    assert!(matches!(second, CycleOutcome::CoolingDown { .. }));
    assert!(limited.last_seen_event_id().is_none());
    assert!(matches!(other, CycleOutcome::Processed { handed_off: 1 }));
}

#[tokio::test]
async fn test_cancelled_before_fetch_hands_off_nothing() {
    let harness = Harness::start().await;

    let poller = harness.poller(FirstRunPolicy::ReplayFeed);
    let pipeline = harness.pipeline(2);
    let mut watch = RepoWatch::new(REPO, Duration::from_secs(60));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let handoff: &dyn EventHandoff = &pipeline;
    let outcome = poller.run_cycle(&mut watch, handoff, &cancel).await;

    assert!(matches!(outcome, CycleOutcome::Cancelled { handed_off: 0 }));
    assert!(harness
        .github
        .received_requests()
        .await
        .unwrap_or_default()
        .is_empty());
}
