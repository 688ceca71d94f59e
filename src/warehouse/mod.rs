//! Load stage: the `asteroids` warehouse table.
//!
//! [`Warehouse`] is the seam the pipeline talks to. [`PostgresWarehouse`]
//! is the real target; [`MemoryWarehouse`] keeps the same contract in
//! process for dry runs and tests.

mod memory;
mod postgres;

pub use memory::MemoryWarehouse;
pub use postgres::PostgresWarehouse;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::EtlError;
use crate::transform::NeoRecord;

pub const DEFAULT_TABLE: &str = "asteroids";

/// Rows per upsert statement.
pub const BATCH_SIZE: usize = 100;

/// Storage for transformed rows keyed on `(id, searching_date)`.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Creates the table and its miss-distance index if absent.
    async fn ensure_schema(&self) -> Result<(), EtlError>;

    /// Inserts every row, overwriting all non-key columns of rows whose key
    /// already exists. Returns the number of rows written.
    async fn load(&self, rows: &[NeoRecord]) -> Result<usize, EtlError>;

    /// Names of rows with `start <= searching_date < end` and
    /// `dist_from <= miss_distance_km < dist_to`.
    async fn select_by_window_and_distance(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        dist_from: f64,
        dist_to: f64,
    ) -> Result<Vec<String>, EtlError>;
}

/// Checks `name` is safe to splice into DDL as an unquoted identifier.
pub fn validate_table_name(name: &str) -> Result<(), EtlError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && name.len() <= 63;

    if valid {
        Ok(())
    } else {
        Err(EtlError::Config(format!(
            "table name '{name}' must match [a-z_][a-z0-9_]* and be at most 63 bytes"
        )))
    }
}

/// Collapses rows sharing a key to the last occurrence, keeping first-seen order.
pub(crate) fn latest_by_key(rows: &[NeoRecord]) -> Vec<&NeoRecord> {
    let mut positions = std::collections::HashMap::with_capacity(rows.len());
    let mut latest: Vec<&NeoRecord> = Vec::with_capacity(rows.len());
    for row in rows {
        match positions.get(&row.key()) {
            Some(&idx) => latest[idx] = row,
            None => {
                positions.insert(row.key(), latest.len());
                latest.push(row);
            }
        }
    }
    latest
}
