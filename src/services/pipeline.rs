//! Classify-then-deliver handoff.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::models::{DeliveryTask, RawEvent};
use crate::domain::ports::{EventHandoff, HandoffOutcome};
use crate::services::classifier;
use crate::services::delivery::{DeliveryEngine, DeliveryOutcome};

/// Classifier, router, formatter and delivery engine, in that order.
///
/// Shared by every repository poller; all per-event state lives on the stack.
pub struct Pipeline {
    engine: Arc<DeliveryEngine>,
}

impl Pipeline {
    /// Pipeline delivering through `engine`.
    pub fn new(engine: Arc<DeliveryEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl EventHandoff for Pipeline {
    async fn handoff(&self, event: RawEvent) -> HandoffOutcome {
        let Some(routable) = classifier::classify(&event) else {
            return HandoffOutcome::Dropped;
        };
        match self.engine.deliver(DeliveryTask::from(routable)).await {
            DeliveryOutcome::Delivered { .. } => HandoffOutcome::Delivered,
            DeliveryOutcome::Failed { .. } => HandoffOutcome::Failed,
        }
    }
}
