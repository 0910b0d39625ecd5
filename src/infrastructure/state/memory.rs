//! In-memory watermark store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::errors::StateError;
use crate::domain::models::WatermarkState;
use crate::domain::ports::WatermarkStore;

/// Watermark store that forgets everything on exit.
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    entries: Mutex<HashMap<String, WatermarkState>>,
}

impl MemoryWatermarkStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-filled with `entries`.
    pub fn with_entries(entries: HashMap<String, WatermarkState>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Current state of `slug`, if recorded.
    pub async fn get(&self, slug: &str) -> Option<WatermarkState> {
        self.entries.lock().await.get(slug).cloned()
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn load(&self) -> Result<HashMap<String, WatermarkState>, StateError> {
        Ok(self.entries.lock().await.clone())
    }

    async fn record(&self, slug: &str, state: WatermarkState) -> Result<(), StateError> {
        self.entries.lock().await.insert(slug.to_string(), state);
        Ok(())
    }

    async fn retain(&self, slugs: &[String]) -> Result<Vec<String>, StateError> {
        let mut entries = self.entries.lock().await;
        let mut dropped: Vec<String> = entries
            .keys()
            .filter(|slug| !slugs.contains(slug))
            .cloned()
            .collect();
        dropped.sort();
        for slug in &dropped {
            entries.remove(slug);
        }
        Ok(dropped)
    }

    async fn flush(&self) -> Result<(), StateError> {
        Ok(())
    }
}
