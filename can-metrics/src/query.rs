//! Query service
//!
//! Stateless read operations over a [`MetricsStore`]: latest snapshot with
//! optional name/category filters, per-signal history, and the catalog
//! grouped by category.

use crate::categorizer::Category;
use crate::store::{CatalogEntry, HistoryEntry, MetricsStore, SignalMetric};
use crate::types::{MetricsError, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Default number of records returned by history queries
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Snapshot filter; name and category filters combine with OR
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotFilter {
    pub names: BTreeSet<String>,
    pub categories: BTreeSet<Category>,
}

impl SnapshotFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_categories(mut self, categories: impl IntoIterator<Item = Category>) -> Self {
        self.categories.extend(categories);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.categories.is_empty()
    }

    pub fn matches(&self, name: &str, metric: &SignalMetric) -> bool {
        if self.is_empty() {
            return true;
        }
        self.names.contains(name) || metric.categories.iter().any(|c| self.categories.contains(c))
    }
}

/// Filtered view of a vehicle's latest record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub vehicle: String,
    pub timestamp: Timestamp,
    pub metrics: BTreeMap<String, SignalMetric>,
    pub metrics_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryView {
    pub vehicle: String,
    pub metric_names: Vec<String>,
    /// Newest first
    pub history: Vec<HistoryEntry>,
}

/// Name and unit of a catalog entry, as listed under a category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub name: String,
    pub unit: String,
}

/// Catalog grouped for presentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedCatalog {
    pub vehicle: String,
    pub metrics_count: usize,
    pub metrics_by_category: BTreeMap<Category, Vec<CatalogItem>>,
    pub all_metrics: Vec<CatalogEntry>,
}

impl GroupedCatalog {
    /// Group entries by category; an entry appears under each of its categories
    pub fn from_entries(vehicle: &str, entries: Vec<CatalogEntry>) -> Self {
        let mut metrics_by_category: BTreeMap<Category, Vec<CatalogItem>> = BTreeMap::new();
        for entry in &entries {
            for category in &entry.categories {
                metrics_by_category
                    .entry(*category)
                    .or_default()
                    .push(CatalogItem {
                        name: entry.name.clone(),
                        unit: entry.unit.clone(),
                    });
            }
        }

        Self {
            vehicle: vehicle.to_string(),
            metrics_count: entries.len(),
            metrics_by_category,
            all_metrics: entries,
        }
    }
}

/// Read-side composition over the metrics store
pub struct QueryService<'a> {
    store: &'a MetricsStore,
}

impl<'a> QueryService<'a> {
    pub fn new(store: &'a MetricsStore) -> Self {
        Self { store }
    }

    /// Latest record of a vehicle, restricted by `filter`
    pub fn snapshot(&self, vehicle_id: &str, filter: &SnapshotFilter) -> Result<Snapshot> {
        let record = self
            .store
            .latest(vehicle_id)?
            .ok_or_else(|| MetricsError::NoData(vehicle_id.to_string()))?;

        let metrics: BTreeMap<String, SignalMetric> = record
            .metrics
            .into_iter()
            .filter(|(name, metric)| filter.matches(name, metric))
            .collect();

        Ok(Snapshot {
            vehicle: record.vehicle,
            timestamp: record.timestamp,
            metrics_count: metrics.len(),
            metrics,
        })
    }

    /// Values of the named signals over the newest `limit` records
    pub fn history(&self, vehicle_id: &str, names: &[String], limit: usize) -> Result<HistoryView> {
        let names: Vec<String> = names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            return Err(MetricsError::InvalidQuery(
                "Please specify at least one metric".to_string(),
            ));
        }
        if limit == 0 {
            return Err(MetricsError::InvalidQuery(
                "History limit must be at least 1".to_string(),
            ));
        }

        let history = self.store.history(vehicle_id, &names, limit)?;
        Ok(HistoryView {
            vehicle: vehicle_id.to_string(),
            metric_names: names,
            history,
        })
    }

    /// Every signal ever observed for a vehicle, grouped by category
    pub fn catalog(&self, vehicle_id: &str) -> Result<GroupedCatalog> {
        let entries = self.store.catalog(vehicle_id)?;
        Ok(GroupedCatalog::from_entries(vehicle_id, entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{at, session};
    use crate::store::{InMemoryBackend, SessionMetadata};

    fn populated_store() -> MetricsStore {
        let store = MetricsStore::new(InMemoryBackend::new());
        let samples = session(&[
            ("BatterySOC", "%", &[71.0]),
            ("MotorRpm", "rpm", &[3200.0]),
            ("CabinTemp", "degC", &[21.5]),
            ("Odometer", "km", &[12034.0]),
        ]);
        store
            .write_session("ioniq5", &SessionMetadata::new(at(0)), &samples)
            .unwrap();
        store
    }

    #[test]
    fn test_snapshot_without_filter_returns_all() {
        let store = populated_store();
        let snapshot = QueryService::new(&store)
            .snapshot("ioniq5", &SnapshotFilter::new())
            .unwrap();
        assert_eq!(snapshot.metrics_count, 4);
        assert_eq!(snapshot.timestamp, at(0));
    }

    #[test]
    fn test_snapshot_names_or_categories() {
        let store = populated_store();
        let filter = SnapshotFilter::new()
            .with_names(["Odometer"])
            .with_categories([Category::Battery]);
        let snapshot = QueryService::new(&store).snapshot("ioniq5", &filter).unwrap();
        let names: Vec<&String> = snapshot.metrics.keys().collect();
        assert_eq!(names, vec!["BatterySOC", "Odometer"]);
    }

    #[test]
    fn test_snapshot_unmatched_category_is_empty() {
        let store = populated_store();
        let filter = SnapshotFilter::new().with_categories([Category::Hvac]);
        let snapshot = QueryService::new(&store).snapshot("ioniq5", &filter).unwrap();
        assert!(snapshot.metrics.is_empty());
        assert_eq!(snapshot.metrics_count, 0);
    }

    #[test]
    fn test_snapshot_without_data() {
        let store = MetricsStore::new(InMemoryBackend::new());
        let err = QueryService::new(&store)
            .snapshot("ioniq5", &SnapshotFilter::new())
            .unwrap_err();
        assert!(matches!(err, MetricsError::NoData(_)));
    }

    #[test]
    fn test_history_requires_names() {
        let store = populated_store();
        let service = QueryService::new(&store);
        let err = service.history("ioniq5", &[], 10).unwrap_err();
        assert!(matches!(err, MetricsError::InvalidQuery(_)));
        let err = service.history("ioniq5", &[" ".to_string()], 10).unwrap_err();
        assert!(matches!(err, MetricsError::InvalidQuery(_)));
        let err = service.history("ioniq5", &["BatterySOC".to_string()], 0).unwrap_err();
        assert!(matches!(err, MetricsError::InvalidQuery(_)));
    }

    #[test]
    fn test_history_view() {
        let store = populated_store();
        let view = QueryService::new(&store)
            .history("ioniq5", &["BatterySOC".to_string(), "Missing".to_string()], 5)
            .unwrap();
        assert_eq!(view.history.len(), 1);
        assert_eq!(view.history[0].metrics.len(), 1);
        assert_eq!(view.metric_names.len(), 2);
    }

    #[test]
    fn test_catalog_grouped_by_category() {
        let store = populated_store();
        let catalog = QueryService::new(&store).catalog("ioniq5").unwrap();
        assert_eq!(catalog.metrics_count, 4);
        assert_eq!(catalog.all_metrics.len(), 4);

        let battery = &catalog.metrics_by_category[&Category::Battery];
        assert_eq!(battery[0].name, "BatterySOC");
        assert_eq!(battery[0].unit, "%");
        assert!(catalog.metrics_by_category.contains_key(&Category::Temperature));
        assert_eq!(catalog.metrics_by_category[&Category::Other][0].name, "Odometer");
    }
}
