//! Library configuration types
//!
//! `PipelineConfig` tunes how recordings are decoded and folded into
//! records; `StoreConfig` selects and opens the metrics store backend.

use crate::store::{InMemoryBackend, JsonFileBackend, MetricsStore};
use crate::types::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for session decoding and record building
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Optional: only decode these specific CAN message IDs
    #[serde(default)]
    pub message_filter: Option<Vec<u32>>,

    /// Optional: stop pulling frames after this many
    #[serde(default)]
    pub max_frames: Option<usize>,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set message filter
    pub fn with_message_filter(mut self, messages: Vec<u32>) -> Self {
        self.message_filter = Some(messages);
        self
    }

    /// Builder method: cap the number of frames read per session
    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    /// Check if a message ID should be processed
    pub fn should_process_message(&self, can_id: u32) -> bool {
        match &self.message_filter {
            Some(messages) => messages.contains(&can_id),
            None => true,
        }
    }
}

/// Metrics store backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Process-local, lost on exit
    #[default]
    Memory,
    /// Single JSON document on disk
    JsonFile,
}

/// Configuration for the metrics store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,

    /// Location of the store document (required for `json_file`)
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Keep every sample of every signal in stored records
    #[serde(default)]
    pub retain_series: bool,
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn json_file(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: StoreKind::JsonFile,
            path: Some(path.into()),
            retain_series: false,
        }
    }

    /// Builder method: keep full time series in stored records
    pub fn with_retained_series(mut self, enabled: bool) -> Self {
        self.retain_series = enabled;
        self
    }

    /// Construct the store described by this configuration
    pub fn open(&self) -> Result<MetricsStore> {
        let store = match self.kind {
            StoreKind::Memory => MetricsStore::new(InMemoryBackend::new()),
            StoreKind::JsonFile => {
                let path = self.path.as_ref().ok_or_else(|| {
                    StorageError::Config("json_file store requires a path".to_string())
                })?;
                log::info!("Opening metrics store: {:?}", path);
                MetricsStore::new(JsonFileBackend::open(path)?)
            }
        };
        Ok(store.with_retained_series(self.retain_series))
    }
}
