//! Forwarding of this process's own log records through the delivery pipeline.
//!
//! [`LogSinkLayer`] sits in the tracing registry next to the console and file
//! layers. It turns qualifying records into [`DeliveryTask`]s for the
//! `log/{LEVEL}` topics and hands them to a bounded channel without ever
//! blocking the caller. [`LogForwarder`] drains that channel through the same
//! [`DeliveryEngine`] that carries GitHub events.

use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::field::{Field, Visit};
use tracing::{info_span, Event, Instrument, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::secret_scrubbing::SecretScrubber;
use crate::domain::models::{DeliveryTask, EventOrigin, RoutableEvent};
use crate::services::delivery::DeliveryEngine;
use crate::services::router::log_topic;

/// Records emitted inside a span with this name are never forwarded.
///
/// The forwarder runs every delivery inside it, so failures to deliver a log
/// record do not produce further log records to deliver.
pub const LOG_SINK_SPAN: &str = "log_sink_delivery";

/// Only records from this crate are forwarded.
const FORWARDED_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Default capacity of the forwarding channel
pub const DEFAULT_CAPACITY: usize = 256;

/// Collects the message and structured fields of one event.
#[derive(Default)]
struct RecordVisitor {
    message: String,
    fields: String,
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Tracing layer that queues this crate's log records for delivery.
pub struct LogSinkLayer {
    threshold: Level,
    sender: mpsc::Sender<DeliveryTask>,
    scrubber: SecretScrubber,
    dropped: Arc<AtomicU64>,
}

impl LogSinkLayer {
    /// Create the layer and the forwarder that drains it.
    pub fn channel(threshold: Level, capacity: usize) -> (Self, LogForwarder) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let layer = Self {
            threshold,
            sender,
            scrubber: SecretScrubber::new(),
            dropped: Arc::clone(&dropped),
        };
        let forwarder = LogForwarder { receiver, dropped };
        (layer, forwarder)
    }

    /// Rendered chat line for one record.
    pub fn render_line(
        timestamp: chrono::DateTime<chrono::Local>,
        target: &str,
        level: &Level,
        text: &str,
    ) -> String {
        format!(
            "*{}* - **{}** - `{}`\n\n{}",
            timestamp.format("%Y-%m-%d %H:%M:%S"),
            target,
            level,
            text
        )
    }

    fn is_forwarded_target(target: &str) -> bool {
        target == FORWARDED_TARGET
            || target
                .strip_prefix(FORWARDED_TARGET)
                .is_some_and(|rest| rest.starts_with("::"))
    }
}

impl<S> Layer<S> for LogSinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > self.threshold || !Self::is_forwarded_target(metadata.target()) {
            return;
        }

        let inside_sink = ctx
            .event_scope(event)
            .is_some_and(|mut scope| scope.any(|span| span.name() == LOG_SINK_SPAN));
        if inside_sink {
            return;
        }

        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);
        let text = format!("{}{}", visitor.message, visitor.fields);
        let line = Self::render_line(chrono::Local::now(), metadata.target(), metadata.level(), &text);
        let body = self.scrubber.scrub(&line);

        let level = metadata.level().as_str().to_string();
        let topic = log_topic(&level);
        let Some(routable) = RoutableEvent::new(EventOrigin::Log { level }, topic, body) else {
            return;
        };

        if self.sender.try_send(DeliveryTask::from(routable)).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Receiving half of the log sink; see [`LogForwarder::spawn`].
pub struct LogForwarder {
    receiver: mpsc::Receiver<DeliveryTask>,
    dropped: Arc<AtomicU64>,
}

impl LogForwarder {
    /// Number of records discarded because the channel was full.
    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }

    /// Deliver queued records until `cancel` fires, then drain what is left.
    ///
    /// Returns the number of records delivered.
    pub fn spawn(
        mut self,
        engine: Arc<DeliveryEngine>,
        cancel: CancellationToken,
    ) -> JoinHandle<u64> {
        tokio::spawn(async move {
            let mut forwarded = 0u64;
            loop {
                let task = tokio::select! {
                    task = self.receiver.recv() => task,
                    () = cancel.cancelled() => break,
                };
                let Some(task) = task else {
                    return forwarded;
                };
                if Self::forward(&engine, task).await {
                    forwarded += 1;
                }
            }

            self.receiver.close();
            while let Some(task) = self.receiver.recv().await {
                if Self::forward(&engine, task).await {
                    forwarded += 1;
                }
            }
            forwarded
        })
    }

    async fn forward(engine: &DeliveryEngine, task: DeliveryTask) -> bool {
        engine
            .deliver(task)
            .instrument(info_span!(LOG_SINK_SPAN))
            .await
            .is_delivered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::DeliveryError;
    use crate::domain::ports::Deliverer;
    use crate::infrastructure::retry::RetryPolicy;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Default)]
    struct Recording {
        tasks: Mutex<Vec<DeliveryTask>>,
        fail: bool,
    }

    #[async_trait]
    impl Deliverer for Recording {
        async fn send(&self, task: &DeliveryTask) -> Result<(), DeliveryError> {
            self.tasks.lock().unwrap().push(task.clone());
            if self.fail {
                Err(DeliveryError::BadRequest("nope".to_string()))
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn engine(deliverer: Arc<Recording>) -> Arc<DeliveryEngine> {
        Arc::new(DeliveryEngine::new(
            deliverer,
            RetryPolicy::new(1, 1, 2),
        ))
    }

    fn drain(forwarder: &mut LogForwarder) -> Vec<DeliveryTask> {
        let mut tasks = Vec::new();
        while let Ok(task) = forwarder.receiver.try_recv() {
            tasks.push(task);
        }
        tasks
    }

    #[test]
    fn test_render_line_format() {
        let timestamp = chrono::Local
            .with_ymd_and_hms(2024, 5, 1, 12, 30, 5)
            .unwrap();
        assert_eq!(
            LogSinkLayer::render_line(timestamp, "mercourier::services::poller", &Level::WARN, "slow"),
            "*2024-05-01 12:30:05* - **mercourier::services::poller** - `WARN`\n\nslow"
        );
    }

    #[test]
    fn test_threshold_and_topic() {
        let (layer, mut forwarder) = LogSinkLayer::channel(Level::INFO, 16);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(target: "mercourier::services", "too quiet");
            tracing::info!(target: "mercourier::services", repo = "acme/widgets", "polled");
            tracing::error!(target: "mercourier::services", "broken");
        });

        let tasks = drain(&mut forwarder);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].topic, "log/INFO");
        assert!(tasks[0].body.ends_with("polled repo=acme/widgets"));
        assert_eq!(tasks[1].topic, "log/ERROR");
    }

    #[test]
    fn test_foreign_targets_are_ignored() {
        let (layer, mut forwarder) = LogSinkLayer::channel(Level::TRACE, 16);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(target: "hyper::proto", "connection reset");
            tracing::error!(target: "mercourierx", "lookalike");
        });

        assert!(drain(&mut forwarder).is_empty());
    }

    #[test]
    fn test_records_inside_sink_span_are_not_forwarded() {
        let (layer, mut forwarder) = LogSinkLayer::channel(Level::INFO, 16);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            let span = info_span!(LOG_SINK_SPAN);
            let _entered = span.enter();
            let inner = info_span!("deliver");
            let _inner = inner.enter();
            tracing::error!(target: "mercourier::services::delivery", "Delivery abandoned");
        });

        assert!(drain(&mut forwarder).is_empty());
    }

    #[test]
    fn test_forwarded_records_are_scrubbed() {
        let (layer, mut forwarder) = LogSinkLayer::channel(Level::INFO, 16);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "mercourier", "retrying with api_key=abc123");
        });

        let tasks = drain(&mut forwarder);
        assert!(!tasks[0].body.contains("abc123"));
    }

    #[test]
    fn test_full_channel_counts_drops() {
        let (layer, forwarder) = LogSinkLayer::channel(Level::INFO, 1);
        let dropped = forwarder.dropped_counter();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            for n in 0..4 {
                tracing::info!(target: "mercourier", n, "burst");
            }
        });

        assert_eq!(dropped.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_forwarder_drains_after_cancel() {
        let (layer, forwarder) = LogSinkLayer::channel(Level::INFO, 16);
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "mercourier", "one");
            tracing::info!(target: "mercourier", "two");
        });

        let deliverer = Arc::new(Recording::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let forwarded = forwarder
            .spawn(engine(Arc::clone(&deliverer)), cancel)
            .await
            .unwrap();

        assert_eq!(forwarded, 2);
        assert_eq!(deliverer.tasks.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_not_counted() {
        let (layer, forwarder) = LogSinkLayer::channel(Level::INFO, 16);
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "mercourier", "one");
        });

        let deliverer = Arc::new(Recording {
            fail: true,
            ..Recording::default()
        });
        let cancel = CancellationToken::new();
        cancel.cancel();
        let forwarded = forwarder.spawn(engine(deliverer), cancel).await.unwrap();
        assert_eq!(forwarded, 0);
    }
}
