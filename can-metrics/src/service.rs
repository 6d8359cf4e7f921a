//! Processing pipeline and the public operations
//!
//! [`MetricsService`] is the entry point a shell talks to. It resolves a
//! vehicle to its protocol and recording, decodes the recording with a
//! cached [`DbcModel`], stores the result, and answers queries.

use crate::config::PipelineConfig;
use crate::decoder::{SessionDecoder, SessionSamples, SessionStats};
use crate::query::{GroupedCatalog, HistoryView, QueryService, Snapshot, SnapshotFilter};
use crate::signals::DbcModel;
use crate::sources::{DbcSource, RecordingSource};
use crate::store::{MetricsStore, SessionMetadata};
use crate::types::{MetricsError, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// A vehicle known to the deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleProfile {
    pub id: String,
    /// Key of the DBC definition this vehicle speaks
    pub protocol: String,
    /// Key of the recording to process
    pub recording: String,
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub year: Option<u16>,
}

/// Registered vehicles by ID
#[derive(Debug, Clone, Default)]
pub struct VehicleRegistry {
    profiles: BTreeMap<String, VehicleProfile>,
}

impl VehicleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a vehicle, replacing any previous profile with the same ID
    pub fn register(&mut self, profile: VehicleProfile) {
        self.profiles.insert(profile.id.clone(), profile);
    }

    pub fn get(&self, vehicle_id: &str) -> Option<&VehicleProfile> {
        self.profiles.get(vehicle_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl FromIterator<VehicleProfile> for VehicleRegistry {
    fn from_iter<T: IntoIterator<Item = VehicleProfile>>(iter: T) -> Self {
        let mut registry = VehicleRegistry::new();
        for profile in iter {
            registry.register(profile);
        }
        registry
    }
}

/// Outcome of processing one recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub success: bool,
    pub vehicle: String,
    pub timestamp: Timestamp,
    pub metrics_processed: usize,
    pub recording_started_at: Option<Timestamp>,
    pub warnings: SessionStats,
}

/// The four logical operations over one store
pub struct MetricsService {
    registry: VehicleRegistry,
    dbc_source: Box<dyn DbcSource>,
    recordings: Box<dyn RecordingSource>,
    store: Arc<MetricsStore>,
    config: PipelineConfig,
    models: RwLock<HashMap<String, Arc<DbcModel>>>,
}

impl MetricsService {
    pub fn new(
        registry: VehicleRegistry,
        dbc_source: impl DbcSource + 'static,
        recordings: impl RecordingSource + 'static,
        store: Arc<MetricsStore>,
    ) -> Self {
        Self {
            registry,
            dbc_source: Box::new(dbc_source),
            recordings: Box::new(recordings),
            store,
            config: PipelineConfig::default(),
            models: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &VehicleRegistry {
        &self.registry
    }

    pub fn store(&self) -> &MetricsStore {
        &self.store
    }

    /// Model for a protocol, loaded through the DBC source on first use
    ///
    /// A load that fails is not cached, so a fixed DBC is picked up on retry.
    pub fn model(&self, protocol: &str) -> Result<Arc<DbcModel>> {
        if let Some(model) = self
            .models
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(protocol)
        {
            return Ok(Arc::clone(model));
        }

        let text = self.dbc_source.dbc_text(protocol)?;
        let model = Arc::new(DbcModel::load(&text)?);
        let stats = model.stats();
        log::info!(
            "Loaded protocol '{}': {} messages, {} signals",
            protocol,
            stats.num_messages,
            stats.num_signals
        );

        let mut models = self.models.write().unwrap_or_else(|e| e.into_inner());
        Ok(Arc::clone(
            models.entry(protocol.to_string()).or_insert(model),
        ))
    }

    /// Decode the vehicle's recording and store it as a new record
    pub fn process(&self, vehicle_id: &str) -> Result<ProcessSummary> {
        let profile = self.profile(vehicle_id)?;
        let (session, started_at) = self.decode_recording(profile)?;
        if session.is_empty() {
            log::warn!(
                "Recording '{}' produced no signals ({} frames read)",
                profile.recording,
                session.stats.frames_seen
            );
            return Err(MetricsError::NoData(vehicle_id.to_string()));
        }

        let metadata = SessionMetadata::now().with_vehicle(
            profile.make.clone(),
            profile.model.clone(),
            profile.year,
        );
        let record = self.store.write_session(vehicle_id, &metadata, &session)?;

        Ok(ProcessSummary {
            success: true,
            vehicle: vehicle_id.to_string(),
            timestamp: record.timestamp,
            metrics_processed: record.metrics_count,
            recording_started_at: started_at,
            warnings: session.stats,
        })
    }

    /// Decode the vehicle's recording without storing anything
    ///
    /// With a non-empty `signals` list only those series are kept; a name
    /// the vehicle's protocol does not define is an invalid query.
    pub fn decode(&self, vehicle_id: &str, signals: &[String]) -> Result<SessionSamples> {
        let profile = self.profile(vehicle_id)?;
        if !signals.is_empty() {
            let model = self.model(&profile.protocol)?;
            if let Some(unknown) = signals.iter().find(|name| model.find_signal(name).is_none()) {
                return Err(MetricsError::InvalidQuery(format!(
                    "Signal '{}' is not defined for protocol '{}'",
                    unknown, profile.protocol
                )));
            }
        }

        let (mut session, _) = self.decode_recording(profile)?;
        if !signals.is_empty() {
            session.signals.retain(|name, _| signals.contains(name));
        }
        if session.is_empty() {
            return Err(MetricsError::NoData(vehicle_id.to_string()));
        }
        Ok(session)
    }

    fn profile(&self, vehicle_id: &str) -> Result<&VehicleProfile> {
        self.registry
            .get(vehicle_id)
            .ok_or_else(|| MetricsError::UnknownVehicle(vehicle_id.to_string()))
    }

    fn decode_recording(
        &self,
        profile: &VehicleProfile,
    ) -> Result<(SessionSamples, Option<Timestamp>)> {
        let model = self.model(&profile.protocol)?;
        let recording = self.recordings.open(&profile.recording)?;
        log::info!(
            "Processing recording '{}' for vehicle '{}'",
            profile.recording,
            profile.id
        );
        if let Some(hint) = recording.vehicle_hint.as_deref() {
            if hint != profile.id {
                log::debug!(
                    "Recording '{}' looks like it belongs to '{}'",
                    profile.recording,
                    hint
                );
            }
        }

        let session = SessionDecoder::new(&model, recording.frames)
            .with_config(&self.config)
            .collect_series();
        Ok((session, recording.started_at))
    }

    pub fn catalog(&self, vehicle_id: &str) -> Result<GroupedCatalog> {
        QueryService::new(&self.store).catalog(vehicle_id)
    }

    pub fn snapshot(&self, vehicle_id: &str, filter: &SnapshotFilter) -> Result<Snapshot> {
        QueryService::new(&self.store).snapshot(vehicle_id, filter)
    }

    pub fn history(&self, vehicle_id: &str, names: &[String], limit: usize) -> Result<HistoryView> {
        QueryService::new(&self.store).history(vehicle_id, names, limit)
    }
}
