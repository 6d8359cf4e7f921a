//! CSV export of decoded recordings
//!
//! One row per sample in time order: `timestamp,signal,value,unit`.

use anyhow::{Context, Result};
use can_metrics::SessionSamples;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
struct SampleRow<'a> {
    /// Seconds since recording start
    timestamp: f64,
    signal: &'a str,
    value: f64,
    unit: &'a str,
}

/// File name used when no output path is given
pub fn default_path(vehicle: &str) -> PathBuf {
    PathBuf::from(format!("{}-decoded.csv", vehicle))
}

/// Write every sample of a session as CSV, returning the row count
///
/// Samples sharing a timestamp keep signal-name order.
pub fn write_csv<W: Write>(session: &SessionSamples, writer: W) -> Result<usize> {
    let mut rows: Vec<SampleRow<'_>> = session
        .signals
        .iter()
        .flat_map(|(name, series)| {
            series.samples.iter().map(move |point| SampleRow {
                timestamp: point.timestamp,
                signal: name,
                value: point.value,
                unit: &series.unit,
            })
        })
        .collect();
    rows.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in &rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(rows.len())
}

pub fn write_csv_file(session: &SessionSamples, path: &Path) -> Result<usize> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let rows = write_csv(session, BufWriter::new(file))
        .with_context(|| format!("Failed to write {:?}", path))?;
    log::info!("Exported {} samples to {:?}", rows, path);
    Ok(rows)
}
