//! Repository poller.
//!
//! One call to [`RepositoryPoller::run_cycle`] performs one conditional fetch
//! of a repository's event feed and hands every unseen event downstream,
//! oldest first, advancing the watermark after each handoff.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::errors::SourceError;
use crate::domain::models::{EventId, FirstRunPolicy, RawEvent, RepoWatch};
use crate::domain::ports::{EventHandoff, EventSource, FeedResponse};
use crate::infrastructure::retry::{RetryError, RetryPolicy};

/// Cooldown applied when a rate-limit response carries no reset time.
pub const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60);

/// What one poll cycle did.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// The feed was unchanged
    NotModified,
    /// First read of the feed; the newest id was adopted without emitting
    Primed {
        /// Newest id in the feed, if it had any events
        adopted: Option<EventId>,
    },
    /// Unseen events were handed downstream
    Processed {
        /// Events handed off this cycle
        handed_off: usize,
    },
    /// The repository is still cooling down from a rate limit
    CoolingDown {
        /// Time left before the next fetch
        remaining: Duration,
    },
    /// The source rate-limited this repository; it now cools down
    RateLimited {
        /// Cooldown now in effect
        cooldown: Duration,
    },
    /// The fetch failed; the watermark is unchanged
    Failed {
        /// Error of the last fetch attempt
        error: SourceError,
    },
    /// Shutdown was requested mid-cycle
    Cancelled {
        /// Events handed off before cancellation
        handed_off: usize,
    },
}

/// Polls one repository at a time against a shared [`EventSource`].
pub struct RepositoryPoller {
    source: Arc<dyn EventSource>,
    retry: RetryPolicy,
    first_run: FirstRunPolicy,
}

impl RepositoryPoller {
    /// Poller fetching from `source` with `retry`, applying `first_run` to unprimed watches.
    pub fn new(source: Arc<dyn EventSource>, retry: RetryPolicy, first_run: FirstRunPolicy) -> Self {
        Self {
            source,
            retry,
            first_run,
        }
    }

    /// Run one poll cycle for `watch`.
    ///
    /// The entity tag is committed only once the whole batch has been handed
    /// off, so an interrupted cycle refetches the same feed next time and the
    /// watermark filters out what was already dispatched.
    #[instrument(skip_all, fields(repo = %watch.slug))]
    pub async fn run_cycle(
        &self,
        watch: &mut RepoWatch,
        handoff: &dyn EventHandoff,
        cancel: &CancellationToken,
    ) -> CycleOutcome {
        if let Some(remaining) = watch.cooldown_remaining(Instant::now()) {
            debug!(remaining_secs = remaining.as_secs(), "Repository is cooling down");
            return CycleOutcome::CoolingDown { remaining };
        }

        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => return CycleOutcome::Cancelled { handed_off: 0 },
            fetched = self.fetch(watch) => fetched,
        };

        let response = match fetched {
            Ok(response) => response,
            Err(failure) => return self.handle_failure(watch, failure),
        };

        watch.set_min_poll_interval(response.rate().poll_interval);
        let rate = response.rate().clone();

        let outcome = match response {
            FeedResponse::NotModified { .. } => {
                debug!("No new events");
                CycleOutcome::NotModified
            }
            FeedResponse::Modified { events, etag, .. } => {
                if !watch.is_primed()
                    && watch.last_seen_event_id().is_none()
                    && self.first_run == FirstRunPolicy::AdoptLatest
                {
                    prime(watch, &events, etag)
                } else {
                    match dispatch(watch, events, handoff, cancel).await {
                        Ok(handed_off) => {
                            watch.commit_etag(etag);
                            CycleOutcome::Processed { handed_off }
                        }
                        Err(handed_off) => CycleOutcome::Cancelled { handed_off },
                    }
                }
            }
        };

        if rate.is_exhausted() {
            let cooldown = cooldown_for(rate.reset_at);
            warn!(
                cooldown_secs = cooldown.as_secs(),
                "Request quota exhausted, cooling down"
            );
            watch.cool_down_until(Instant::now() + cooldown);
        }

        outcome
    }

    async fn fetch(&self, watch: &RepoWatch) -> Result<FeedResponse, RetryError<SourceError>> {
        let source = &self.source;
        let slug = watch.slug.as_str();
        let etag = watch.etag();
        self.retry
            .execute(move |_| source.fetch_events(slug, etag))
            .await
    }

    fn handle_failure(
        &self,
        watch: &mut RepoWatch,
        failure: RetryError<SourceError>,
    ) -> CycleOutcome {
        let attempts = failure.attempts();
        match failure.into_error() {
            SourceError::RateLimited { reset_at } => {
                let cooldown = cooldown_for(reset_at);
                warn!(cooldown_secs = cooldown.as_secs(), "Rate limited, cooling down");
                watch.cool_down_until(Instant::now() + cooldown);
                CycleOutcome::RateLimited { cooldown }
            }
            error => {
                error!(attempts, %error, "Poll cycle failed, skipping");
                CycleOutcome::Failed { error }
            }
        }
    }
}

/// Events of `events` not yet seen by `watch`, oldest first, without repeats.
pub fn select_new(watch: &RepoWatch, events: Vec<RawEvent>) -> Vec<RawEvent> {
    let mut fresh: Vec<RawEvent> = events
        .into_iter()
        .filter(|event| watch.is_unseen(&event.id))
        .collect();
    fresh.sort_by(|a, b| a.id.cmp(&b.id));
    fresh.dedup_by(|a, b| a.id == b.id);
    fresh
}

fn prime(watch: &mut RepoWatch, events: &[RawEvent], etag: Option<String>) -> CycleOutcome {
    let adopted = events.iter().map(|event| &event.id).max().cloned();
    if let Some(id) = &adopted {
        watch.advance_to(id);
    }
    watch.commit_etag(etag);
    info!(
        adopted = adopted.as_ref().map(EventId::as_str),
        skipped = events.len(),
        "First poll, adopting newest event without replaying the feed"
    );
    CycleOutcome::Primed { adopted }
}

/// Hand off unseen events in order. `Err` carries the count handed off before
/// cancellation.
async fn dispatch(
    watch: &mut RepoWatch,
    events: Vec<RawEvent>,
    handoff: &dyn EventHandoff,
    cancel: &CancellationToken,
) -> Result<usize, usize> {
    let fresh = select_new(watch, events);
    let mut handed_off = 0;

    for event in fresh {
        if cancel.is_cancelled() {
            info!(handed_off, "Shutdown requested, stopping mid-batch");
            return Err(handed_off);
        }
        let id = event.id.clone();
        let outcome = handoff.handoff(event).await;
        debug!(event_id = %id, ?outcome, "Event handed off");
        watch.advance_to(&id);
        handed_off += 1;
    }

    if handed_off > 0 {
        info!(handed_off, "Processed new events");
    }
    Ok(handed_off)
}

fn cooldown_for(reset_at: Option<DateTime<Utc>>) -> Duration {
    reset_at
        .map_or(DEFAULT_RATE_LIMIT_COOLDOWN, |at| {
            (at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
        })
        .max(Duration::from_secs(1))
}
