//! Message delivery port.

use async_trait::async_trait;

use crate::domain::errors::DeliveryError;
use crate::domain::models::DeliveryTask;

/// Capability of sending one message to a topic.
///
/// The production implementation talks to the chat server; the console
/// implementation renders the task locally. Everything upstream is identical
/// for both.
#[async_trait]
pub trait Deliverer: Send + Sync {
    /// Send a single message. One call is one attempt; retries are the
    /// caller's business.
    async fn send(&self, task: &DeliveryTask) -> Result<(), DeliveryError>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}
