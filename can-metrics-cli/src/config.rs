//! Configuration loading and parsing

use anyhow::{bail, Context, Result};
use can_metrics::{
    CandumpRecordingSource, FileDbcSource, PipelineConfig, StoreConfig, StoreKind,
    VehicleProfile, VehicleRegistry,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "default_store")]
    pub store: StoreConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Protocol key -> DBC file
    #[serde(default)]
    pub protocols: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub vehicles: Vec<VehicleConfig>,
}

fn default_store() -> StoreConfig {
    StoreConfig::json_file("metrics.json")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VehicleConfig {
    pub id: String,
    pub protocol: String,
    /// candump log to process for this vehicle
    pub recording: PathBuf,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<u16>,
}

impl AppConfig {
    /// Resolve relative paths against `base`
    fn resolve_paths(&mut self, base: &Path) {
        if let Some(path) = self.store.path.as_mut() {
            *path = resolve(base, path);
        }
        for path in self.protocols.values_mut() {
            *path = resolve(base, path);
        }
        for vehicle in &mut self.vehicles {
            vehicle.recording = resolve(base, &vehicle.recording);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.store.kind == StoreKind::JsonFile && self.store.path.is_none() {
            bail!("[store] kind = \"json_file\" requires a path");
        }

        let mut seen = BTreeSet::new();
        for vehicle in &self.vehicles {
            if !self.protocols.contains_key(&vehicle.protocol) {
                bail!(
                    "Vehicle '{}' uses unknown protocol '{}'",
                    vehicle.id,
                    vehicle.protocol
                );
            }
            if !seen.insert(vehicle.id.as_str()) {
                bail!("Vehicle '{}' is declared more than once", vehicle.id);
            }
        }
        Ok(())
    }

    /// Vehicle registry; each vehicle's recording key is its ID
    pub fn registry(&self) -> VehicleRegistry {
        self.vehicles
            .iter()
            .map(|v| VehicleProfile {
                id: v.id.clone(),
                protocol: v.protocol.clone(),
                recording: v.id.clone(),
                make: v.make.clone(),
                model: v.model.clone(),
                year: v.year,
            })
            .collect()
    }

    pub fn dbc_source(&self) -> FileDbcSource {
        self.protocols
            .iter()
            .fold(FileDbcSource::new(), |source, (key, path)| {
                source.with_protocol(key.clone(), path.clone())
            })
    }

    pub fn recording_source(&self) -> CandumpRecordingSource {
        self.vehicles
            .iter()
            .fold(CandumpRecordingSource::new(), |source, v| {
                source.with_recording(v.id.clone(), v.recording.clone())
            })
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Parse configuration text; relative paths resolve against `base`
pub fn parse_config(content: &str, base: &Path) -> Result<AppConfig> {
    let mut config: AppConfig = toml::from_str(content).context("Invalid configuration")?;
    config.resolve_paths(base);
    config.validate()?;
    Ok(config)
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    parse_config(&content, base)
        .with_context(|| format!("Failed to parse config file: {:?}", path))
}
