//! Downstream handoff port.

use async_trait::async_trait;

use crate::domain::models::RawEvent;

/// What happened to an event handed downstream by the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffOutcome {
    /// Classified and delivered
    Delivered,
    /// Classified, but delivery was abandoned after logging the failure
    Failed,
    /// Not routable, dropped
    Dropped,
}

/// Downstream of the poller. Every outcome counts as dispatched, so the
/// watermark may advance past the event.
#[async_trait]
pub trait EventHandoff: Send + Sync {
    /// Take one event off the poller's hands.
    async fn handoff(&self, event: RawEvent) -> HandoffOutcome;
}
