//! CAN Metrics Library
//!
//! Turns raw CAN recordings into queryable vehicle metrics using signal
//! definitions from DBC files.
//!
//! # Architecture
//!
//! - `signals` parses DBC text into an immutable [`DbcModel`]
//! - `message_decoder` extracts physical values from one frame
//! - `decoder` streams a whole recording into per-signal time series
//! - `categorizer` assigns signals to functional categories by name
//! - `store` persists one record per processed session plus a catalog
//! - `query` answers snapshot, history and catalog requests
//! - `service` ties the above together behind [`MetricsService`]
//!
//! Frame and DBC sources are traits (`sources`), so recordings can come from
//! candump logs on disk or from memory.
//!
//! # Example Usage
//!
//! ```no_run
//! use can_metrics::{
//!     CandumpRecordingSource, FileDbcSource, MetricsService, SnapshotFilter, StoreConfig,
//!     VehicleProfile, VehicleRegistry,
//! };
//! use std::sync::Arc;
//!
//! let mut registry = VehicleRegistry::new();
//! registry.register(VehicleProfile {
//!     id: "ioniq5".to_string(),
//!     protocol: "hyundai-kia".to_string(),
//!     recording: "trip-1".to_string(),
//!     make: Some("Hyundai".to_string()),
//!     model: Some("Ioniq 5".to_string()),
//!     year: Some(2022),
//! });
//!
//! let store = StoreConfig::json_file("data/metrics.json").open().unwrap();
//! let service = MetricsService::new(
//!     registry,
//!     FileDbcSource::new().with_protocol("hyundai-kia", "dbc/hyundai_kia.dbc"),
//!     CandumpRecordingSource::new().with_recording("trip-1", "logs/trip-1.log"),
//!     Arc::new(store),
//! );
//!
//! let summary = service.process("ioniq5").unwrap();
//! println!("Stored {} metrics", summary.metrics_processed);
//!
//! let snapshot = service.snapshot("ioniq5", &SnapshotFilter::new()).unwrap();
//! for (name, metric) in &snapshot.metrics {
//!     println!("{} = {} {}", name, metric.value, metric.unit);
//! }
//! ```

pub mod categorizer;
pub mod config;
pub mod decoder;
pub mod formats;
pub mod message_decoder;
pub mod query;
pub mod service;
pub mod signals;
pub mod sources;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use categorizer::{categorize, Category};
pub use config::{PipelineConfig, StoreConfig, StoreKind};
pub use decoder::{
    decode_session, SamplePoint, SessionDecoder, SessionSamples, SessionStats, SignalSeries,
};
pub use formats::CandumpParser;
pub use message_decoder::{decode, DecodedFrame, MessageDecoder};
pub use query::{
    CatalogItem, GroupedCatalog, HistoryView, QueryService, Snapshot, SnapshotFilter,
    DEFAULT_HISTORY_LIMIT,
};
pub use service::{MetricsService, ProcessSummary, VehicleProfile, VehicleRegistry};
pub use signals::{DatabaseStats, DbcModel};
pub use sources::{
    CandumpRecordingSource, DbcSource, FileDbcSource, MemoryDbcSource, MemoryRecordingSource,
    Recording, RecordingSource,
};
pub use store::{
    CatalogEntry, HistoryEntry, InMemoryBackend, JsonFileBackend, MetricRecord, MetricsBackend,
    MetricsStore, SessionMetadata, SignalMetric,
};
pub use types::{
    DecodedSample, ErrorKind, MetricsError, RawFrame, Result, StorageError, Timestamp,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
