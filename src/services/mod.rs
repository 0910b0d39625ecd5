//! Service layer
//!
//! - `classifier`: decides which events are routable and builds them
//! - `router`: event to topic mapping
//! - `formatter`: Zulip markdown bodies
//! - `poller`: one poll cycle per repository
//! - `delivery`: retrying front of a deliverer
//! - `pipeline`: classifier and delivery behind the poller's handoff port

pub mod classifier;
pub mod delivery;
pub mod formatter;
pub mod pipeline;
pub mod poller;
pub mod router;

pub use delivery::{DeliveryEngine, DeliveryOutcome};
pub use pipeline::Pipeline;
pub use poller::{CycleOutcome, RepositoryPoller};
