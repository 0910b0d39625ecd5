//! Watermark persistence port.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::errors::StateError;
use crate::domain::models::WatermarkState;

/// Persistence for per-repository watermarks, keyed by `owner/name` slug.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Load every stored watermark. A store that has never been written is empty.
    async fn load(&self) -> Result<HashMap<String, WatermarkState>, StateError>;

    /// Record the state of one repository and persist it.
    async fn record(&self, slug: &str, state: WatermarkState) -> Result<(), StateError>;

    /// Drop entries for repositories not in `slugs`. Returns the dropped slugs.
    async fn retain(&self, slugs: &[String]) -> Result<Vec<String>, StateError>;

    /// Persist everything currently held.
    async fn flush(&self) -> Result<(), StateError>;
}
