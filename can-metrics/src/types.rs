//! Core types for the CAN metrics library
//!
//! This module defines the frames the decoder consumes, the samples it emits,
//! and the error type shared by every layer from DBC loading to queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wall-clock timestamp used for processed sessions and the catalog
pub type Timestamp = DateTime<Utc>;

/// Result type for library operations
pub type Result<T> = std::result::Result<T, MetricsError>;

/// Raw CAN frame from a recording
///
/// Produced by a frame source and consumed, never mutated, by the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// Capture time in seconds since the start of the recording
    pub timestamp: f64,
    /// CAN arbitration ID (11-bit or 29-bit)
    pub arbitration_id: u32,
    /// Frame data bytes (0-8 bytes for classic CAN, up to 64 for CAN-FD)
    pub data: Vec<u8>,
}

impl RawFrame {
    pub fn new(arbitration_id: u32, data: impl Into<Vec<u8>>, timestamp: f64) -> Self {
        Self {
            timestamp,
            arbitration_id,
            data: data.into(),
        }
    }

    /// Get the data length code (DLC) - number of data bytes
    pub fn dlc(&self) -> usize {
        self.data.len()
    }
}

/// One physical value extracted from one frame
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSample {
    /// Public signal name (namespaced when it collides across messages)
    pub name: String,
    /// Physical value after scaling and offset
    pub value: f64,
    /// Engineering unit (e.g., "km/h", "°C", "V"); empty when the DBC has none
    pub unit: String,
    /// Seconds since recording start, copied from the source frame
    pub timestamp: f64,
}

/// Storage-layer failures
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Store I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Store document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Store misconfigured: {0}")]
    Config(String),
}

/// Errors that can occur anywhere in the decode/store/query path
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to parse DBC: {0}")]
    Parse(String),

    #[error("Unknown vehicle: {0}")]
    UnknownVehicle(String),

    #[error("Frame 0x{arbitration_id:X} too short: expected {expected} bytes, got {actual}")]
    FrameTooShort {
        arbitration_id: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Message not found: CAN ID 0x{0:X}")]
    UnknownMessage(u32),

    #[error("No data found for vehicle: {0}")]
    NoData(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Frame source error: {0}")]
    Source(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Stable, transport-independent classification of a [`MetricsError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ParseError,
    UnknownVehicle,
    FrameTooShort,
    UnknownMessage,
    NoData,
    InvalidQuery,
    SourceError,
    StorageError,
}

impl ErrorKind {
    /// HTTP-style status class a shell should map this kind to
    pub fn status_class(&self) -> u16 {
        match self {
            ErrorKind::UnknownVehicle | ErrorKind::InvalidQuery => 400,
            ErrorKind::NoData => 404,
            ErrorKind::ParseError
            | ErrorKind::FrameTooShort
            | ErrorKind::UnknownMessage
            | ErrorKind::SourceError
            | ErrorKind::StorageError => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ParseError => "parse_error",
            ErrorKind::UnknownVehicle => "unknown_vehicle",
            ErrorKind::FrameTooShort => "frame_too_short",
            ErrorKind::UnknownMessage => "unknown_message",
            ErrorKind::NoData => "no_data",
            ErrorKind::InvalidQuery => "invalid_query",
            ErrorKind::SourceError => "source_error",
            ErrorKind::StorageError => "storage_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MetricsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MetricsError::Parse(_) => ErrorKind::ParseError,
            MetricsError::UnknownVehicle(_) => ErrorKind::UnknownVehicle,
            MetricsError::FrameTooShort { .. } => ErrorKind::FrameTooShort,
            MetricsError::UnknownMessage(_) => ErrorKind::UnknownMessage,
            MetricsError::NoData(_) => ErrorKind::NoData,
            MetricsError::InvalidQuery(_) => ErrorKind::InvalidQuery,
            MetricsError::Source(_) => ErrorKind::SourceError,
            MetricsError::Storage(_) => ErrorKind::StorageError,
        }
    }
}
