//! External collaborators supplying DBC text and recordings
//!
//! The pipeline only sees these traits. File-backed implementations serve
//! the CLI; in-memory ones serve embedding and tests.

use crate::formats::CandumpParser;
use crate::signals::dbc::decode_dbc_bytes;
use crate::types::{MetricsError, RawFrame, Result, Timestamp};
use std::collections::HashMap;
use std::path::PathBuf;

/// Lazily pulled frames of one recording
pub type FrameStream = Box<dyn Iterator<Item = Result<RawFrame>> + Send>;

/// One recording, ready to be decoded
pub struct Recording {
    pub frames: FrameStream,
    /// Wall-clock time of the first frame, when the source knows it
    pub started_at: Option<Timestamp>,
    /// Vehicle the source believes recorded this, e.g. from a file name
    pub vehicle_hint: Option<String>,
}

impl Recording {
    pub fn from_frames(frames: Vec<RawFrame>) -> Self {
        Self {
            frames: Box::new(frames.into_iter().map(Ok)),
            started_at: None,
            vehicle_hint: None,
        }
    }
}

/// Supplies DBC text by protocol key
pub trait DbcSource: Send + Sync {
    fn dbc_text(&self, protocol: &str) -> Result<String>;
}

/// Supplies recordings by recording key
pub trait RecordingSource: Send + Sync {
    fn open(&self, recording: &str) -> Result<Recording>;
}

/// DBC files on disk, one per protocol key
#[derive(Debug, Clone, Default)]
pub struct FileDbcSource {
    paths: HashMap<String, PathBuf>,
}

impl FileDbcSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(protocol.into(), path.into());
        self
    }
}

impl DbcSource for FileDbcSource {
    fn dbc_text(&self, protocol: &str) -> Result<String> {
        let path = self
            .paths
            .get(protocol)
            .ok_or_else(|| {
                MetricsError::Source(format!("No DBC registered for protocol '{}'", protocol))
            })?;

        log::info!("Loading DBC file for '{}': {:?}", protocol, path);
        let bytes = std::fs::read(path).map_err(|e| {
            MetricsError::Source(format!("Failed to read DBC file {:?}: {}", path, e))
        })?;
        Ok(decode_dbc_bytes(bytes))
    }
}

/// candump log files on disk, one per recording key
#[derive(Debug, Clone, Default)]
pub struct CandumpRecordingSource {
    paths: HashMap<String, PathBuf>,
}

impl CandumpRecordingSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recording(mut self, key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(key.into(), path.into());
        self
    }
}

impl RecordingSource for CandumpRecordingSource {
    fn open(&self, recording: &str) -> Result<Recording> {
        let path = self
            .paths
            .get(recording)
            .ok_or_else(|| {
                MetricsError::Source(format!("No recording registered as '{}'", recording))
            })?;

        let mut frames = CandumpParser::parse(path)?;
        // Pull the first frame so the recording's start time is known up front
        let first = frames.next();
        let started_at = frames.started_at();

        Ok(Recording {
            frames: Box::new(first.into_iter().chain(frames)),
            started_at,
            vehicle_hint: path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned()),
        })
    }
}

/// DBC text held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryDbcSource {
    texts: HashMap<String, String>,
}

impl MemoryDbcSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>, text: impl Into<String>) -> Self {
        self.texts.insert(protocol.into(), text.into());
        self
    }
}

impl DbcSource for MemoryDbcSource {
    fn dbc_text(&self, protocol: &str) -> Result<String> {
        self.texts
            .get(protocol)
            .cloned()
            .ok_or_else(|| {
                MetricsError::Source(format!("No DBC registered for protocol '{}'", protocol))
            })
    }
}

/// Recordings held in memory; each open replays the stored frames
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordingSource {
    recordings: HashMap<String, Vec<RawFrame>>,
}

impl MemoryRecordingSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recording(mut self, key: impl Into<String>, frames: Vec<RawFrame>) -> Self {
        self.recordings.insert(key.into(), frames);
        self
    }
}

impl RecordingSource for MemoryRecordingSource {
    fn open(&self, recording: &str) -> Result<Recording> {
        self.recordings
            .get(recording)
            .cloned()
            .map(Recording::from_frames)
            .ok_or_else(|| {
                MetricsError::Source(format!("No recording registered as '{}'", recording))
            })
    }
}
