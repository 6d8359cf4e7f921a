//! JSON document backend
//!
//! Keeps the whole store in memory and rewrites a single JSON document on
//! every session write. The document is written to a sibling temp file and
//! renamed over the previous one, so readers of the file never observe a
//! half-written session.
//!
//! Updating the in-memory state costs only the size of the session, but
//! each write still serializes the full history. Deployments with long
//! histories want a database backend behind [`MetricsBackend`].

use super::memory::StoreState;
use super::{CatalogEntry, MetricRecord, MetricsBackend, StorageResult};
use crate::types::StorageError;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub struct JsonFileBackend {
    path: PathBuf,
    state: RwLock<StoreState>,
}

impl JsonFileBackend {
    /// Open the document at `path`, starting empty if it does not exist yet
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        let state = if path.exists() {
            let bytes = fs::read(&path).map_err(|e| io_error(&path, e))?;
            let state: StoreState = serde_json::from_slice(&bytes)?;
            log::info!(
                "Opened metrics store {:?} with {} records",
                path,
                state.record_count()
            );
            state
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
            }
            log::info!("Creating new metrics store at {:?}", path);
            StoreState::default()
        };

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, state: &StoreState) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, bytes).map_err(|e| io_error(&tmp_path, e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| io_error(&self.path, e))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl MetricsBackend for JsonFileBackend {
    fn insert_session(&self, record: &MetricRecord, catalog: &[CatalogEntry]) -> StorageResult<()> {
        let mut state = self.state.write().map_err(|_| StorageError::Poisoned)?;

        // Roll the live state back if the document cannot be written
        let applied = state.apply_session(record, catalog);
        if let Err(e) = self.persist(&state) {
            log::error!("Failed to persist metrics store {:?}: {}", self.path, e);
            state.revert(applied);
            return Err(e);
        }
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
