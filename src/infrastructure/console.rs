//! Console deliverer for `--zulip-off` runs.

use async_trait::async_trait;
use console::{style, Term};

use crate::domain::errors::DeliveryError;
use crate::domain::models::DeliveryTask;
use crate::domain::ports::Deliverer;

/// Renders each task to stdout instead of sending it.
///
/// Everything upstream of the deliverer is unchanged, so a local run shows
/// exactly which topic every message would land in.
pub struct ConsoleDeliverer {
    stream: String,
    term: Term,
}

impl ConsoleDeliverer {
    /// Deliverer that labels output with `stream`.
    pub fn new(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            term: Term::stdout(),
        }
    }

    /// Plain-text rendering of `task`, without styling.
    pub fn render(&self, task: &DeliveryTask) -> String {
        format!("#{} > {}\n{}\n", self.stream, task.topic, task.body.trim_end())
    }
}

#[async_trait]
impl Deliverer for ConsoleDeliverer {
    async fn send(&self, task: &DeliveryTask) -> Result<(), DeliveryError> {
        let rendered = self.render(task);
        let (header, body) = rendered.split_once('\n').unwrap_or((rendered.as_str(), ""));
        let text = format!(
            "{}\n{}{}\n",
            style(header).cyan().bold(),
            body,
            style("─".repeat(40)).dim()
        );
        self.term
            .write_str(&text)
            .map_err(|e| DeliveryError::Network(format!("console write failed: {e}")))
    }

    fn name(&self) -> &'static str {
        "console"
    }
}
