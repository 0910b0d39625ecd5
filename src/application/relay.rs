//! Relay orchestration.
//!
//! Owns the set of [`RepoWatch`]es, runs one polling task per repository and
//! persists watermarks after every cycle and once more at shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::domain::errors::StateError;
use crate::domain::models::{GitHubConfig, RepoWatch};
use crate::domain::ports::{EventHandoff, WatermarkStore};
use crate::services::poller::{CycleOutcome, RepositoryPoller};

/// A configured repository and its poll interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    /// `owner/name` of the repository
    pub slug: String,
    /// Delay between poll cycles
    pub poll_interval: Duration,
}

impl WatchTarget {
    /// One target per configured repository, with per-repository overrides applied.
    pub fn from_config(config: &GitHubConfig) -> Vec<Self> {
        config
            .repositories
            .iter()
            .map(|repo| Self {
                slug: repo.slug().to_string(),
                poll_interval: Duration::from_secs(
                    repo.poll_interval_secs(config.poll_interval_secs),
                ),
            })
            .collect()
    }
}

/// Summary of a relay run, returned once every task has stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Polling tasks started
    pub repositories: usize,
    /// Tasks that stopped on their own after cancellation
    pub completed: usize,
    /// Tasks aborted after the shutdown timeout
    pub aborted: usize,
    /// Tasks that panicked
    pub crashed: usize,
}

/// Runs the polling tasks.
pub struct Relay {
    poller: Arc<RepositoryPoller>,
    handoff: Arc<dyn EventHandoff>,
    store: Arc<dyn WatermarkStore>,
    shutdown_timeout: Duration,
}

impl Relay {
    /// Create a relay that hands events to `handoff` and records watermarks in `store`.
    pub fn new(
        poller: Arc<RepositoryPoller>,
        handoff: Arc<dyn EventHandoff>,
        store: Arc<dyn WatermarkStore>,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            poller,
            handoff,
            store,
            shutdown_timeout,
        }
    }

    /// Build watches for `targets`, restoring stored watermarks.
    ///
    /// Stored entries for repositories that are no longer configured are
    /// removed from the store.
    pub async fn restore_watches(&self, targets: &[WatchTarget]) -> Result<Vec<RepoWatch>, StateError> {
        let mut stored = self.store.load().await?;

        let slugs: Vec<String> = targets.iter().map(|target| target.slug.clone()).collect();
        let dropped = self.store.retain(&slugs).await?;
        for slug in &dropped {
            stored.remove(slug);
            info!(repo = %slug, "Dropping watermark of repository no longer configured");
        }

        Ok(targets
            .iter()
            .map(|target| {
                let watch = RepoWatch::new(target.slug.clone(), target.poll_interval);
                match stored.remove(&target.slug) {
                    Some(state) => {
                        debug!(
                            repo = %target.slug,
                            last_seen = ?state.last_seen_event_id,
                            "Restored watermark"
                        );
                        watch.restore(state)
                    }
                    None => watch,
                }
            })
            .collect())
    }

    /// Poll every watch until `cancel` fires, then shut down.
    ///
    /// After cancellation, tasks get `shutdown_timeout` to finish the handoff
    /// in progress before they are aborted. Watermarks are flushed either way.
    pub async fn run(self, watches: Vec<RepoWatch>, cancel: CancellationToken) -> RelayReport {
        let mut report = RelayReport {
            repositories: watches.len(),
            ..RelayReport::default()
        };
        info!(repositories = watches.len(), "Relay started");

        let mut tasks = JoinSet::new();
        for watch in watches {
            let span = tracing::info_span!("watch", repo = %watch.slug);
            tasks.spawn(
                watch_loop(
                    Arc::clone(&self.poller),
                    Arc::clone(&self.handoff),
                    Arc::clone(&self.store),
                    watch,
                    cancel.clone(),
                )
                .instrument(span),
            );
        }

        // A task only ends on its own after cancellation, unless it panicked.
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                joined = tasks.join_next() => match joined {
                    Some(Err(join_error)) => {
                        error!(%join_error, "Repository task crashed");
                        report.crashed += 1;
                    }
                    Some(Ok(())) => report.completed += 1,
                    None => break,
                },
            }
        }

        info!(
            timeout_secs = self.shutdown_timeout.as_secs(),
            "Shutting down, waiting for repository tasks"
        );
        let drained = tokio::time::timeout(self.shutdown_timeout, async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(()) => report.completed += 1,
                    Err(join_error) => {
                        error!(%join_error, "Repository task crashed");
                        report.crashed += 1;
                    }
                }
            }
        })
        .await;

        if drained.is_err() {
            report.aborted = tasks.len();
            warn!(
                aborted = report.aborted,
                "Shutdown timeout elapsed, aborting remaining repository tasks"
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        if let Err(error) = self.store.flush().await {
            error!(%error, "Failed to save watermarks at shutdown");
        }

        info!(
            completed = report.completed,
            aborted = report.aborted,
            "Relay stopped"
        );
        report
    }
}

/// Poll one repository until cancelled.
async fn watch_loop(
    poller: Arc<RepositoryPoller>,
    handoff: Arc<dyn EventHandoff>,
    store: Arc<dyn WatermarkStore>,
    mut watch: RepoWatch,
    cancel: CancellationToken,
) {
    loop {
        let outcome = poller.run_cycle(&mut watch, handoff.as_ref(), &cancel).await;

        if let Err(error) = store.record(&watch.slug, watch.state()).await {
            error!(%error, "Failed to save watermark");
        }

        if matches!(outcome, CycleOutcome::Cancelled { .. }) || cancel.is_cancelled() {
            break;
        }

        let delay = watch.next_delay(Instant::now());
        debug!(?outcome, delay_secs = delay.as_secs(), "Next poll scheduled");

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }
    debug!("Repository task stopped");
}
