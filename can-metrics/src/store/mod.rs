//! Metrics store
//!
//! Persists decoded sessions as immutable [`MetricRecord`]s and keeps a
//! per-vehicle catalog of every signal ever observed. Durable storage is
//! delegated to a [`MetricsBackend`]; the store itself holds no global state
//! and is shared between workers behind an `Arc`.

mod json_file;
mod memory;

pub use json_file::JsonFileBackend;
pub use memory::InMemoryBackend;

use crate::categorizer::{categorize, Category};
use crate::decoder::{SamplePoint, SessionSamples};
use crate::types::{Result, StorageError, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Descriptive data attached to one processed session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<u16>,
    /// Wall-clock time the session was processed
    pub processed_at: Timestamp,
}

impl SessionMetadata {
    pub fn new(processed_at: Timestamp) -> Self {
        Self {
            make: None,
            model: None,
            year: None,
            processed_at,
        }
    }

    /// Metadata stamped with the current time
    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    pub fn with_vehicle(
        mut self,
        make: Option<String>,
        model: Option<String>,
        year: Option<u16>,
    ) -> Self {
        self.make = make;
        self.model = model;
        self.year = year;
        self
    }
}

/// Stored view of one signal within a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMetric {
    /// Latest value of the session
    pub value: f64,
    pub unit: String,
    pub categories: BTreeSet<Category>,
    pub sample_count: usize,
    pub min: f64,
    pub max: f64,
    /// Full series, only kept when the store retains series
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<SamplePoint>,
}

impl SignalMetric {
    pub fn has_category(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }
}

/// One processed session for one vehicle; never modified after insertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub vehicle: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<u16>,
    pub timestamp: Timestamp,
    pub metrics: BTreeMap<String, SignalMetric>,
    pub metrics_count: usize,
}

impl MetricRecord {
    /// Catalog rows observed by this record
    pub fn catalog_entries(&self) -> Vec<CatalogEntry> {
        self.metrics
            .iter()
            .map(|(name, metric)| CatalogEntry {
                vehicle: self.vehicle.clone(),
                name: name.clone(),
                unit: metric.unit.clone(),
                categories: metric.categories.clone(),
                last_seen: self.timestamp,
            })
            .collect()
    }
}

/// Catalog row keyed by (vehicle, signal name)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub vehicle: String,
    #[serde(rename = "metric_name")]
    pub name: String,
    pub unit: String,
    pub categories: BTreeSet<Category>,
    pub last_seen: Timestamp,
}

impl CatalogEntry {
    /// Fold an observation into this entry
    ///
    /// Timestamps are compared, not assigned: an observation older than
    /// `last_seen` leaves the entry untouched. Returns true if applied.
    pub fn merge(&mut self, observed: &CatalogEntry) -> bool {
        if observed.last_seen < self.last_seen {
            log::debug!(
                "Ignoring stale catalog update for {}/{} ({} < {})",
                self.vehicle,
                self.name,
                observed.last_seen,
                self.last_seen
            );
            return false;
        }
        self.unit = observed.unit.clone();
        self.categories = observed.categories.clone();
        self.last_seen = observed.last_seen;
        true
    }
}

/// Requested signals of one record, for history queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: Timestamp,
    pub metrics: BTreeMap<String, SignalMetric>,
}

/// Persistence collaborator behind the metrics store
///
/// Implementations must make `insert_session` atomic: either the record and
/// every catalog upsert become visible, or none do. Upserts must go through
/// [`CatalogEntry::merge`] under the same exclusive section so concurrent
/// writers to one key are serialized.
pub trait MetricsBackend: Send + Sync {
    /// Append a record and upsert its catalog entries
    fn insert_session(&self, record: &MetricRecord, catalog: &[CatalogEntry]) -> StorageResult<()>;

    /// Records of one vehicle, newest first, at most `limit`
    fn find_records(&self, vehicle: &str, limit: Option<usize>) -> StorageResult<Vec<MetricRecord>>;

    /// Catalog of one vehicle, sorted by signal name
    fn catalog_entries(&self, vehicle: &str) -> StorageResult<Vec<CatalogEntry>>;
}

/// The metrics store
pub struct MetricsStore {
    backend: Box<dyn MetricsBackend>,
    retain_series: bool,
}

impl MetricsStore {
    pub fn new(backend: impl MetricsBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            retain_series: false,
        }
    }

    /// Builder method: keep every sample in stored records
    pub fn with_retained_series(mut self, enabled: bool) -> Self {
        self.retain_series = enabled;
        self
    }

    /// Build the record for a session without storing it
    pub fn build_record(
        &self,
        vehicle_id: &str,
        metadata: &SessionMetadata,
        samples: &SessionSamples,
    ) -> MetricRecord {
        let metrics: BTreeMap<String, SignalMetric> = samples
            .signals
            .iter()
            .filter_map(|(name, series)| {
                let latest = series.latest()?;
                let (min, max) = series
                    .samples
                    .iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                        (lo.min(p.value), hi.max(p.value))
                    });
                let metric = SignalMetric {
                    value: latest.value,
                    unit: series.unit.clone(),
                    categories: categorize(name),
                    sample_count: series.samples.len(),
                    min,
                    max,
                    series: if self.retain_series {
                        series.samples.clone()
                    } else {
                        Vec::new()
                    },
                };
                Some((name.clone(), metric))
            })
            .collect();

        MetricRecord {
            vehicle: vehicle_id.to_string(),
            make: metadata.make.clone(),
            model: metadata.model.clone(),
            year: metadata.year,
            timestamp: metadata.processed_at,
            metrics_count: metrics.len(),
            metrics,
        }
    }

    /// Store one session and upsert its catalog entries atomically
    pub fn write_session(
        &self,
        vehicle_id: &str,
        metadata: &SessionMetadata,
        samples: &SessionSamples,
    ) -> Result<MetricRecord> {
        let record = self.build_record(vehicle_id, metadata, samples);
        let catalog = record.catalog_entries();

        self.backend.insert_session(&record, &catalog)?;
        log::info!(
            "Stored {} metrics for vehicle '{}' at {}",
            record.metrics_count,
            vehicle_id,
            record.timestamp
        );
        Ok(record)
    }

    /// Most recent record for a vehicle
    pub fn latest(&self, vehicle_id: &str) -> Result<Option<MetricRecord>> {
        let mut records = self.backend.find_records(vehicle_id, Some(1))?;
        Ok(records.pop())
    }

    /// Requested signals across the newest `limit` records, newest first
    pub fn history(
        &self,
        vehicle_id: &str,
        signal_names: &[String],
        limit: usize,
    ) -> Result<Vec<HistoryEntry>> {
        let records = self.backend.find_records(vehicle_id, Some(limit))?;
        Ok(records
            .into_iter()
            .map(|record| HistoryEntry {
                timestamp: record.timestamp,
                metrics: record
                    .metrics
                    .into_iter()
                    .filter(|(name, _)| signal_names.contains(name))
                    .collect(),
            })
            .collect())
    }

    /// Every signal ever observed for a vehicle
    pub fn catalog(&self, vehicle_id: &str) -> Result<Vec<CatalogEntry>> {
        Ok(self.backend.catalog_entries(vehicle_id)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::decoder::SignalSeries;
    use chrono::{Duration, TimeZone};

    pub(crate) fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    pub(crate) fn session(signals: &[(&str, &str, &[f64])]) -> SessionSamples {
        let mut session = SessionSamples::default();
        for (name, unit, values) in signals {
            session.signals.insert(
                name.to_string(),
                SignalSeries {
                    unit: unit.to_string(),
                    samples: values
                        .iter()
                        .enumerate()
                        .map(|(i, v)| SamplePoint {
                            timestamp: i as f64 * 0.1,
                            value: *v,
                        })
                        .collect(),
                },
            );
        }
        session
    }

    #[test]
    fn test_write_then_latest_round_trip() {
        let store = MetricsStore::new(InMemoryBackend::new());
        let samples = session(&[
            ("BatterySOC", "%", &[80.0, 79.5]),
            ("MotorTemp", "degC", &[45.0]),
        ]);
        let metadata = SessionMetadata::new(at(0)).with_vehicle(
            Some("Hyundai".to_string()),
            Some("Ioniq 5".to_string()),
            Some(2022),
        );

        let written = store.write_session("ioniq5", &metadata, &samples).unwrap();
        let latest = store.latest("ioniq5").unwrap().unwrap();
        assert_eq!(written, latest);
        assert_eq!(latest.metrics_count, 2);
        assert_eq!(latest.make.as_deref(), Some("Hyundai"));

        let soc = &latest.metrics["BatterySOC"];
        assert_eq!(soc.value, 79.5);
        assert_eq!(soc.unit, "%");
        assert_eq!(soc.sample_count, 2);
        assert_eq!(soc.min, 79.5);
        assert_eq!(soc.max, 80.0);
        assert!(soc.has_category(Category::Battery));
        assert!(soc.series.is_empty());

        let temp = &latest.metrics["MotorTemp"];
        assert_eq!(
            temp.categories,
            BTreeSet::from([Category::Drivetrain, Category::Temperature])
        );
    }

    #[test]
    fn test_latest_for_unknown_vehicle_is_none() {
        let store = MetricsStore::new(InMemoryBackend::new());
        assert!(store.latest("nobody").unwrap().is_none());
    }

    #[test]
    fn test_retained_series() {
        let store = MetricsStore::new(InMemoryBackend::new()).with_retained_series(true);
        let samples = session(&[("VehicleSpeed", "km/h", &[10.0, 20.0, 30.0])]);
        let record = store
            .write_session("kona", &SessionMetadata::new(at(0)), &samples)
            .unwrap();
        assert_eq!(record.metrics["VehicleSpeed"].series.len(), 3);
    }

    #[test]
    fn test_catalog_monotonic_in_order() {
        let store = MetricsStore::new(InMemoryBackend::new());
        let samples = session(&[("BatterySOC", "%", &[80.0])]);
        store.write_session("ev6", &SessionMetadata::new(at(10)), &samples).unwrap();
        store.write_session("ev6", &SessionMetadata::new(at(20)), &samples).unwrap();

        let catalog = store.catalog("ev6").unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].last_seen, at(20));
    }

    #[test]
    fn test_catalog_monotonic_out_of_order() {
        let store = MetricsStore::new(InMemoryBackend::new());
        store
            .write_session("ev6", &SessionMetadata::new(at(20)), &session(&[("BatterySOC", "%", &[80.0])]))
            .unwrap();
        store
            .write_session("ev6", &SessionMetadata::new(at(10)), &session(&[("BatterySOC", "pct", &[81.0])]))
            .unwrap();

        let catalog = store.catalog("ev6").unwrap();
        assert_eq!(catalog[0].last_seen, at(20));
        assert_eq!(catalog[0].unit, "%");
        // Both records are still stored
        assert_eq!(store.history("ev6", &["BatterySOC".to_string()], 10).unwrap().len(), 2);
    }

    #[test]
    fn test_history_newest_first_bounded() {
        let store = MetricsStore::new(InMemoryBackend::new());
        for i in 0..5 {
            let samples = session(&[("BatterySOC", "%", &[i as f64]), ("Odometer", "km", &[1.0])]);
            store
                .write_session("niro", &SessionMetadata::new(at(i)), &samples)
                .unwrap();
        }

        let history = store
            .history("niro", &["BatterySOC".to_string()], 3)
            .unwrap();
        let stamps: Vec<Timestamp> = history.iter().map(|h| h.timestamp).collect();
        assert_eq!(stamps, vec![at(4), at(3), at(2)]);
        assert_eq!(history[0].metrics.len(), 1);
        assert_eq!(history[0].metrics["BatterySOC"].value, 4.0);
    }

    #[test]
    fn test_catalog_entry_merge() {
        let mut entry = CatalogEntry {
            vehicle: "v".to_string(),
            name: "Speed".to_string(),
            unit: "km/h".to_string(),
            categories: BTreeSet::from([Category::VehicleStatus]),
            last_seen: at(5),
        };
        let mut older = entry.clone();
        older.last_seen = at(1);
        older.unit = "mph".to_string();
        assert!(!entry.merge(&older));
        assert_eq!(entry.unit, "km/h");

        let mut newer = entry.clone();
        newer.last_seen = at(9);
        assert!(entry.merge(&newer));
        assert_eq!(entry.last_seen, at(9));
    }

    #[test]
    fn test_catalog_entry_serializes_metric_name() {
        let entry = CatalogEntry {
            vehicle: "v".to_string(),
            name: "Speed".to_string(),
            unit: String::new(),
            categories: BTreeSet::from([Category::VehicleStatus]),
            last_seen: at(0),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["metric_name"], "Speed");
        assert_eq!(json["categories"][0], "vehicle_status");
    }
}
