//! Port trait definitions
//!
//! - EventSource: upstream event feed (GitHub)
//! - Deliverer: one-shot message send (Zulip or console)
//! - WatermarkStore: watermark persistence
//! - EventHandoff: everything downstream of the poller

pub mod deliverer;
pub mod event_source;
pub mod handoff;
pub mod watermark_store;

pub use deliverer::Deliverer;
pub use event_source::{EventSource, FeedResponse, RateStatus};
pub use handoff::{EventHandoff, HandoffOutcome};
pub use watermark_store::WatermarkStore;
