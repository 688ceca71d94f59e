//! Run artifacts and metric printing.
//!
//! Both snapshots live under fixed names in the artifact directory and are
//! overwritten on every run.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use tracing::{debug, info};

use crate::error::EtlError;
use crate::fetch::NeoFeed;
use crate::metrics::AsteroidMetrics;
use crate::transform::{COLUMNS, NeoRecord};

/// Locations of the raw JSON and transformed CSV snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub raw_json: PathBuf,
    pub table_csv: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: &Path, window_days: u32) -> Self {
        let stem = format!("near_earth_objects_{window_days}_days");
        Self {
            raw_json: dir.join(format!("{stem}.json")),
            table_csv: dir.join(format!("{stem}.csv")),
        }
    }
}

/// Writes the raw `near_earth_objects` map as pretty JSON.
pub fn write_raw_snapshot(path: &Path, feed: &NeoFeed) -> Result<(), EtlError> {
    debug!(path = %path.display(), dates = feed.len(), "Writing raw snapshot");
    let file = File::create(path).map_err(|e| EtlError::snapshot(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, feed).map_err(|e| EtlError::snapshot(path, e))?;
    writer.flush().map_err(|e| EtlError::snapshot(path, e))
}

/// Writes the transformed table as CSV with a header row, also when empty.
pub fn write_table_snapshot(path: &Path, rows: &[NeoRecord]) -> Result<(), EtlError> {
    debug!(path = %path.display(), rows = rows.len(), "Writing table snapshot");
    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| EtlError::snapshot(path, e))?;

    // serialize() only emits the header with the first record
    if rows.is_empty() {
        writer.write_record(COLUMNS).map_err(|e| EtlError::snapshot(path, e))?;
    }
    for row in rows {
        writer.serialize(row).map_err(|e| EtlError::snapshot(path, e))?;
    }
    writer.flush().map_err(|e| EtlError::snapshot(path, e))
}

/// Prints the metrics as `key: value` lines.
pub fn print_metrics<W: Write>(out: &mut W, metrics: &AsteroidMetrics) -> std::io::Result<()> {
    writeln!(out, "potentially_hazardous_count: {}", metrics.potentially_hazardous_count)?;
    writeln!(out, "name_with_max_estimated_diam: {}", metrics.name_with_max_estimated_diam)?;
    writeln!(out, "min_collision_hours: {}", metrics.min_collision_hours)
}

/// Logs the metrics as structured fields.
pub fn log_metrics(metrics: &AsteroidMetrics) {
    info!(
        potentially_hazardous_count = metrics.potentially_hazardous_count,
        name_with_max_estimated_diam = %metrics.name_with_max_estimated_diam,
        min_collision_hours = metrics.min_collision_hours,
        "Asteroid metrics"
    );
}
