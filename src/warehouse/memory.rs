use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use super::{Warehouse, latest_by_key};
use crate::error::EtlError;
use crate::transform::NeoRecord;

/// In-process table with the same key and query semantics as Postgres.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    rows: Mutex<BTreeMap<(i64, NaiveDate), NeoRecord>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored row, ordered by key.
    pub fn rows(&self) -> Vec<NeoRecord> {
        self.table().values().cloned().collect()
    }

    fn table(&self) -> std::sync::MutexGuard<'_, BTreeMap<(i64, NaiveDate), NeoRecord>> {
        // A poisoned lock still holds a consistent map: writes are single inserts.
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn ensure_schema(&self) -> Result<(), EtlError> {
        Ok(())
    }

    async fn load(&self, rows: &[NeoRecord]) -> Result<usize, EtlError> {
        let latest = latest_by_key(rows);
        let mut table = self.table();
        for row in &latest {
            table.insert(row.key(), (*row).clone());
        }
        debug!(rows = latest.len(), stored = table.len(), "Upserted into memory table");
        Ok(latest.len())
    }

    async fn select_by_window_and_distance(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        dist_from: f64,
        dist_to: f64,
    ) -> Result<Vec<String>, EtlError> {
        Ok(self
            .table()
            .values()
            .filter(|r| start <= r.searching_date && r.searching_date < end)
            .filter(|r| dist_from <= r.miss_distance_km && r.miss_distance_km < dist_to)
            .map(|r| r.name.clone())
            .collect())
    }
}
