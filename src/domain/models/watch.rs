//! Per-repository polling state.

use std::time::Duration;

use tokio::time::Instant;

use super::event::EventId;

/// Persisted part of a [`RepoWatch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatermarkState {
    /// Entity tag of the last fully processed feed response
    pub last_etag: Option<String>,
    /// Newest event id already handed downstream
    pub last_seen_event_id: Option<EventId>,
}

/// One monitored repository.
///
/// Owned by exactly one polling task; the watermark only ever moves forward.
#[derive(Debug, Clone)]
pub struct RepoWatch {
    /// `owner/name` of the repository
    pub slug: String,
    /// Configured delay between poll cycles
    pub poll_interval: Duration,
    last_seen_event_id: Option<EventId>,
    etag: Option<String>,
    /// False until the feed has been read once (or state was restored)
    primed: bool,
    cooldown_until: Option<Instant>,
    /// Lower bound on the poll delay advertised by the event source
    min_poll_interval: Option<Duration>,
}

impl RepoWatch {
    /// A watch that has never read its feed.
    pub fn new(slug: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            slug: slug.into(),
            poll_interval,
            last_seen_event_id: None,
            etag: None,
            primed: false,
            cooldown_until: None,
            min_poll_interval: None,
        }
    }

    /// Restore a watch from persisted state.
    ///
    /// The watch counts as primed only if the state shows a completed read:
    /// a watermark or a committed entity tag. State saved after a failed first
    /// cycle has neither, so the first-run policy still applies.
    pub fn restore(mut self, state: WatermarkState) -> Self {
        self.last_seen_event_id = state.last_seen_event_id;
        self.etag = state.last_etag.filter(|etag| !etag.is_empty());
        self.primed = self.last_seen_event_id.is_some() || self.etag.is_some();
        self
    }

    /// Newest event id handed downstream.
    pub fn last_seen_event_id(&self) -> Option<&EventId> {
        self.last_seen_event_id.as_ref()
    }

    /// Entity tag for the next conditional request.
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// Whether the feed has been read at least once.
    pub fn is_primed(&self) -> bool {
        self.primed
    }

    /// Move the watermark to `id` if it is newer. Returns whether it moved.
    pub fn advance_to(&mut self, id: &EventId) -> bool {
        match &self.last_seen_event_id {
            Some(current) if current >= id => false,
            _ => {
                self.last_seen_event_id = Some(id.clone());
                true
            }
        }
    }

    /// Record that a feed response has been fully processed.
    pub fn commit_etag(&mut self, etag: Option<String>) {
        self.etag = etag;
        self.primed = true;
    }

    /// Returns true if `id` has not been handed downstream yet.
    pub fn is_unseen(&self, id: &EventId) -> bool {
        self.last_seen_event_id
            .as_ref()
            .is_none_or(|current| id > current)
    }

    /// Skip polling until `until`.
    pub fn cool_down_until(&mut self, until: Instant) {
        self.cooldown_until = Some(until);
    }

    /// Remaining cooldown, clearing it once expired.
    pub fn cooldown_remaining(&mut self, now: Instant) -> Option<Duration> {
        match self.cooldown_until {
            Some(until) if until > now => Some(until - now),
            Some(_) => {
                self.cooldown_until = None;
                None
            }
            None => None,
        }
    }

    /// Record the poll interval floor advertised by the source.
    pub fn set_min_poll_interval(&mut self, interval: Option<Duration>) {
        self.min_poll_interval = interval;
    }

    /// Delay until the next poll cycle should start.
    pub fn next_delay(&mut self, now: Instant) -> Duration {
        let base = self
            .min_poll_interval
            .map_or(self.poll_interval, |floor| self.poll_interval.max(floor));
        self.cooldown_remaining(now)
            .map_or(base, |cooldown| cooldown.max(Duration::from_secs(1)))
    }

    /// Snapshot of the persisted part.
    pub fn state(&self) -> WatermarkState {
        WatermarkState {
            last_etag: self.etag.clone(),
            last_seen_event_id: self.last_seen_event_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watch() -> RepoWatch {
        RepoWatch::new("acme/widgets", Duration::from_secs(60))
    }

    #[test]
    fn test_advance_is_monotonic() {
        let mut watch = watch();
        assert!(watch.advance_to(&EventId::new("100")));
        assert!(!watch.advance_to(&EventId::new("99")));
        assert!(!watch.advance_to(&EventId::new("100")));
        assert!(watch.advance_to(&EventId::new("1000")));
        assert_eq!(watch.last_seen_event_id().unwrap().as_str(), "1000");
    }

    #[test]
    fn test_is_unseen() {
        let mut watch = watch();
        assert!(watch.is_unseen(&EventId::new("1")));
        watch.advance_to(&EventId::new("5"));
        assert!(!watch.is_unseen(&EventId::new("5")));
        assert!(!watch.is_unseen(&EventId::new("4")));
        assert!(watch.is_unseen(&EventId::new("6")));
    }

    #[test]
    fn test_restore_without_watermark_or_etag_is_not_primed() {
        let watch = watch().restore(WatermarkState {
            last_etag: Some(String::new()),
            last_seen_event_id: None,
        });
        assert!(!watch.is_primed());
        assert_eq!(watch.etag(), None);
    }

    #[test]
    fn test_restore_with_watermark_is_primed() {
        let watch = watch().restore(WatermarkState {
            last_etag: Some(String::new()),
            last_seen_event_id: Some(EventId::new("42")),
        });
        assert!(watch.is_primed());
        assert_eq!(watch.last_seen_event_id().unwrap().as_str(), "42");
    }

    #[test]
    fn test_restore_after_empty_feed_is_primed() {
        let watch = watch().restore(WatermarkState {
            last_etag: Some("\"empty\"".to_string()),
            last_seen_event_id: None,
        });
        assert!(watch.is_primed());
        assert_eq!(watch.etag(), Some("\"empty\""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_delay_honors_cooldown_and_floor() {
        let mut watch = watch();
        let now = Instant::now();
        assert_eq!(watch.next_delay(now), Duration::from_secs(60));

        watch.set_min_poll_interval(Some(Duration::from_secs(90)));
        assert_eq!(watch.next_delay(now), Duration::from_secs(90));

        watch.cool_down_until(now + Duration::from_secs(600));
        assert_eq!(watch.next_delay(now), Duration::from_secs(600));

        let later = now + Duration::from_secs(601);
        assert_eq!(watch.next_delay(later), Duration::from_secs(90));
        assert_eq!(watch.cooldown_remaining(later), None);
    }
}
