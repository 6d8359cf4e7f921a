//! In-memory metrics backend

use super::{CatalogEntry, MetricRecord, MetricsBackend, StorageResult};
use crate::types::StorageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Full contents of a store: append-only records plus the catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct StoreState {
    /// Records in insertion order
    records: Vec<MetricRecord>,
    /// vehicle -> signal name -> entry
    catalog: BTreeMap<String, BTreeMap<String, CatalogEntry>>,
}

/// What one applied session changed, enough to roll it back
#[derive(Debug)]
pub(crate) struct AppliedSession {
    records_before: usize,
    /// (vehicle, signal, entry before the merge); None when the signal was new
    replaced: Vec<(String, String, Option<CatalogEntry>)>,
}

impl StoreState {
    /// Append a record and merge its catalog entries in place
    ///
    /// Cost is proportional to the session, not to the stored history.
    pub(crate) fn apply_session(
        &mut self,
        record: &MetricRecord,
        catalog: &[CatalogEntry],
    ) -> AppliedSession {
        let records_before = self.records.len();
        self.records.push(record.clone());

        let mut replaced = Vec::with_capacity(catalog.len());
        for observed in catalog {
            let entries = self.catalog.entry(observed.vehicle.clone()).or_default();
            let previous = match entries.get_mut(&observed.name) {
                Some(existing) => {
                    let before = existing.clone();
                    existing.merge(observed);
                    Some(before)
                }
                None => {
                    entries.insert(observed.name.clone(), observed.clone());
                    None
                }
            };
            replaced.push((observed.vehicle.clone(), observed.name.clone(), previous));
        }

        AppliedSession {
            records_before,
            replaced,
        }
    }

    /// Undo an [`apply_session`](Self::apply_session) that was the last change
    pub(crate) fn revert(&mut self, applied: AppliedSession) {
        self.records.truncate(applied.records_before);

        // Newest first, so a name merged twice ends at its original entry
        for (vehicle, name, previous) in applied.replaced.into_iter().rev() {
            let Some(entries) = self.catalog.get_mut(&vehicle) else {
                continue;
            };
            match previous {
                Some(entry) => {
                    entries.insert(name, entry);
                }
                None => {
                    entries.remove(&name);
                }
            }
            if entries.is_empty() {
                self.catalog.remove(&vehicle);
            }
        }
    }

    pub(crate) fn find_records(&self, vehicle: &str, limit: Option<usize>) -> Vec<MetricRecord> {
        // Reverse first so equal timestamps keep the latest insertion in front
        let mut matching: Vec<&MetricRecord> = self
            .records
            .iter()
            .rev()
            .filter(|r| r.vehicle == vehicle)
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        matching
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub(crate) fn catalog_entries(&self, vehicle: &str) -> Vec<CatalogEntry> {
        self.catalog
            .get(vehicle)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn record_count(&self) -> usize {
        self.records.len()
    }
}

/// Process-local backend guarded by a read/write lock
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: RwLock<StoreState>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsBackend for InMemoryBackend {
    fn insert_session(&self, record: &MetricRecord, catalog: &[CatalogEntry]) -> StorageResult<()> {
        let mut state = self.state.write().map_err(|_| StorageError::Poisoned)?;
        state.apply_session(record, catalog);
        Ok(())
    }

    fn find_records(&self, vehicle: &str, limit: Option<usize>) -> StorageResult<Vec<MetricRecord>> {
        let state = self.state.read().map_err(|_| StorageError::Poisoned)?;
        Ok(state.find_records(vehicle, limit))
    }

    fn catalog_entries(&self, vehicle: &str) -> StorageResult<Vec<CatalogEntry>> {
        let state = self.state.read().map_err(|_| StorageError::Poisoned)?;
        Ok(state.catalog_entries(vehicle))
    }
}
