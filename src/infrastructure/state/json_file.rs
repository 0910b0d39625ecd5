//! JSON file watermark store.
//!
//! The file maps each slug to `{"last_etag": "...", "processed_events": id}`
//! and is replaced atomically on every write.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::domain::errors::StateError;
use crate::domain::models::{EventId, WatermarkState};
use crate::domain::ports::WatermarkStore;

/// On-disk shape of one repository entry.
///
/// An unknown etag is stored as the empty string, an unknown watermark as
/// `null`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredWatermark {
    #[serde(default)]
    last_etag: String,
    #[serde(default)]
    processed_events: Option<EventId>,
}

impl From<&WatermarkState> for StoredWatermark {
    fn from(state: &WatermarkState) -> Self {
        Self {
            last_etag: state.last_etag.clone().unwrap_or_default(),
            processed_events: state.last_seen_event_id.clone(),
        }
    }
}

impl From<StoredWatermark> for WatermarkState {
    fn from(stored: StoredWatermark) -> Self {
        Self {
            last_etag: Some(stored.last_etag).filter(|etag| !etag.is_empty()),
            last_seen_event_id: stored.processed_events,
        }
    }
}

/// Watermark store backed by a single JSON file
///
/// Every write replaces the whole file through a temporary sibling and a
/// rename, so a crash mid-write leaves the previous version intact.
#[derive(Debug)]
pub struct JsonFileWatermarkStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, WatermarkState>>,
}

impl JsonFileWatermarkStore {
    /// Store backed by `path`. Nothing is read until [`WatermarkStore::load`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Write `entries` to disk. Callers hold the entries lock, which also
    /// serializes concurrent writers.
    async fn persist(&self, entries: &HashMap<String, WatermarkState>) -> Result<(), StateError> {
        let stored: BTreeMap<&str, StoredWatermark> = entries
            .iter()
            .map(|(slug, state)| (slug.as_str(), StoredWatermark::from(state)))
            .collect();
        let json = serde_json::to_vec_pretty(&stored)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(path = %self.path.display(), repositories = stored.len(), "Watermarks saved");
        Ok(())
    }
}

#[async_trait]
impl WatermarkStore for JsonFileWatermarkStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Result<HashMap<String, WatermarkState>, StateError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file yet");
                return Ok(HashMap::new());
            }
            Err(error) => return Err(error.into()),
        };

        let stored: HashMap<String, StoredWatermark> = if bytes.iter().all(u8::is_ascii_whitespace)
        {
            HashMap::new()
        } else {
            serde_json::from_slice(&bytes)?
        };

        let loaded: HashMap<String, WatermarkState> = stored
            .into_iter()
            .map(|(slug, entry)| (slug, WatermarkState::from(entry)))
            .collect();

        let mut entries = self.entries.lock().await;
        entries.clone_from(&loaded);
        Ok(loaded)
    }

    async fn record(&self, slug: &str, state: WatermarkState) -> Result<(), StateError> {
        let mut entries = self.entries.lock().await;
        if entries.get(slug) == Some(&state) {
            return Ok(());
        }
        entries.insert(slug.to_string(), state);
        self.persist(&entries).await
    }

    async fn retain(&self, slugs: &[String]) -> Result<Vec<String>, StateError> {
        let mut entries = self.entries.lock().await;
        let mut dropped: Vec<String> = entries
            .keys()
            .filter(|slug| !slugs.contains(slug))
            .cloned()
            .collect();
        if dropped.is_empty() {
            return Ok(dropped);
        }
        dropped.sort();
        for slug in &dropped {
            entries.remove(slug);
        }
        self.persist(&entries).await?;
        Ok(dropped)
    }

    async fn flush(&self) -> Result<(), StateError> {
        let entries = self.entries.lock().await;
        self.persist(&entries).await
    }
}
