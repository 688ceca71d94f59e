use serde::Serialize;

use crate::error::EtlError;
use crate::transform::NeoRecord;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Summary of one run's transformed table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsteroidMetrics {
    pub potentially_hazardous_count: usize,
    pub name_with_max_estimated_diam: String,
    pub min_collision_hours: f64,
}

impl AsteroidMetrics {
    /// Computes the three metrics over `rows`.
    ///
    /// `name_with_max_estimated_diam` picks the first row holding the maximum
    /// `estimated_diameter_max_km`. `min_collision_hours` is the smallest
    /// `miss_distance_km / relative_velocity_km_sec`, in hours.
    ///
    /// # Errors
    ///
    /// [`EtlError::Metrics`] if the table is empty, has no hazardous row, or
    /// has a row with zero velocity.
    pub fn from_rows(rows: &[NeoRecord]) -> Result<Self, EtlError> {
        if rows.is_empty() {
            return Err(EtlError::Metrics("table is empty".to_string()));
        }

        let potentially_hazardous_count = rows.iter().filter(|r| r.is_potentially_hazardous).count();
        if potentially_hazardous_count == 0 {
            return Err(EtlError::Metrics("no potentially hazardous rows".to_string()));
        }

        if let Some(stalled) = rows.iter().find(|r| r.relative_velocity_km_sec == 0.0) {
            return Err(EtlError::Metrics(format!(
                "'{}' on {} has zero relative velocity",
                stalled.name, stalled.searching_date
            )));
        }

        // non-finite diameters never win the max
        let mut largest: Option<&NeoRecord> = None;
        for row in rows.iter().filter(|r| r.estimated_diameter_max_km.is_finite()) {
            if largest.is_none_or(|l| row.estimated_diameter_max_km > l.estimated_diameter_max_km) {
                largest = Some(row);
            }
        }
        let largest = largest
            .ok_or_else(|| EtlError::Metrics("no row has a finite estimated diameter".to_string()))?;

        let min_collision_seconds = rows
            .iter()
            .map(NeoRecord::collision_seconds)
            .fold(f64::INFINITY, f64::min);

        Ok(Self {
            potentially_hazardous_count,
            name_with_max_estimated_diam: largest.name.clone(),
            min_collision_hours: min_collision_seconds / SECONDS_PER_HOUR,
        })
    }
}
