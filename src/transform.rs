//! Transform stage: flatten the nested feed into one row per object and date.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::EtlError;
use crate::fetch::NeoFeed;

/// Column names of the transformed table, in serialization order.
pub const COLUMNS: [&str; 8] = [
    "id",
    "name",
    "is_potentially_hazardous_asteroid",
    "estimated_diameter_min_km",
    "estimated_diameter_max_km",
    "relative_velocity_km_sec",
    "miss_distance_km",
    "searching_date",
];

/// One row of the transformed table. Serialized field names are the
/// warehouse column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeoRecord {
    pub id: i64,
    pub name: String,
    #[serde(rename = "is_potentially_hazardous_asteroid")]
    pub is_potentially_hazardous: bool,
    pub estimated_diameter_min_km: f64,
    pub estimated_diameter_max_km: f64,
    pub relative_velocity_km_sec: f64,
    pub miss_distance_km: f64,
    pub searching_date: NaiveDate,
}

impl NeoRecord {
    /// Composite key, unique per table.
    pub fn key(&self) -> (i64, NaiveDate) {
        (self.id, self.searching_date)
    }

    /// Miss distance over velocity, in seconds.
    pub fn collision_seconds(&self) -> f64 {
        self.miss_distance_km / self.relative_velocity_km_sec
    }
}

/// Flattens every object under every date key into a [`NeoRecord`].
///
/// Velocity and miss distance come from the first `close_approach_data`
/// entry only; objects with several approaches in the window still yield a
/// single row per date.
///
/// Rows sharing `(id, searching_date)` collapse to the last occurrence, kept
/// at the position of the first.
///
/// # Errors
///
/// [`EtlError::Schema`] for a malformed date key or any record with a missing
/// or mistyped field. No partial table is returned.
pub fn transform(feed: &NeoFeed) -> Result<Vec<NeoRecord>, EtlError> {
    let mut rows: Vec<NeoRecord> = Vec::new();
    let mut positions: HashMap<(i64, NaiveDate), usize> = HashMap::new();

    for (date_key, objects) in feed {
        let searching_date = NaiveDate::parse_from_str(date_key, "%Y-%m-%d")
            .map_err(|e| EtlError::Schema(format!("date key '{date_key}': {e}")))?;

        for (idx, raw) in objects.iter().enumerate() {
            let record = project(raw, searching_date)
                .map_err(|e| EtlError::Schema(format!("{date_key}[{idx}]: {e}")))?;

            match positions.entry(record.key()) {
                Entry::Occupied(slot) => {
                    warn!(id = record.id, date = %searching_date, "Duplicate object in feed, keeping last");
                    rows[*slot.get()] = record;
                }
                Entry::Vacant(slot) => {
                    slot.insert(rows.len());
                    rows.push(record);
                }
            }
        }
    }

    Ok(rows)
}

fn project(raw: &Value, searching_date: NaiveDate) -> Result<NeoRecord, String> {
    let approach = lookup(raw, &["close_approach_data"])?
        .as_array()
        .ok_or("'close_approach_data' is not an array")?
        .first()
        .ok_or("'close_approach_data' is empty")?;

    Ok(NeoRecord {
        id: to_i64(lookup(raw, &["id"])?, "id")?,
        name: lookup(raw, &["name"])?
            .as_str()
            .ok_or("'name' is not a string")?
            .to_string(),
        is_potentially_hazardous: lookup(raw, &["is_potentially_hazardous_asteroid"])?
            .as_bool()
            .ok_or("'is_potentially_hazardous_asteroid' is not a boolean")?,
        estimated_diameter_min_km: to_f64(
            lookup(raw, &["estimated_diameter", "kilometers", "estimated_diameter_min"])?,
            "estimated_diameter_min",
        )?,
        estimated_diameter_max_km: to_f64(
            lookup(raw, &["estimated_diameter", "kilometers", "estimated_diameter_max"])?,
            "estimated_diameter_max",
        )?,
        relative_velocity_km_sec: to_f64(
            lookup(approach, &["relative_velocity", "kilometers_per_second"])?,
            "kilometers_per_second",
        )?,
        miss_distance_km: to_f64(lookup(approach, &["miss_distance", "kilometers"])?, "kilometers")?,
        searching_date,
    })
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Result<&'a Value, String> {
    path.iter()
        .try_fold(value, |node, key| node.get(key))
        .ok_or_else(|| format!("missing '{}'", path.join(".")))
}

// The feed sends most numbers as strings.
fn to_f64(value: &Value, field: &str) -> Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
    .ok_or_else(|| format!("'{field}' is not a finite number: {value}"))
}

fn to_i64(value: &Value, field: &str) -> Result<i64, String> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| format!("'{field}' is not an integer: {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn neo(id: &str, name: &str, velocity: &str, distance: &str) -> Value {
        json!({
            "id": id,
            "neo_reference_id": id,
            "name": name,
            "is_potentially_hazardous_asteroid": false,
            "estimated_diameter": {
                "kilometers": {"estimated_diameter_min": 0.1, "estimated_diameter_max": 0.25},
                "meters": {"estimated_diameter_min": 100.0, "estimated_diameter_max": 250.0}
            },
            "close_approach_data": [
                {
                    "close_approach_date": "2024-05-08",
                    "relative_velocity": {"kilometers_per_second": velocity, "kilometers_per_hour": "1"},
                    "miss_distance": {"kilometers": distance, "lunar": "1"}
                },
                {
                    "close_approach_date": "2024-05-09",
                    "relative_velocity": {"kilometers_per_second": "99.0"},
                    "miss_distance": {"kilometers": "1.0"}
                }
            ]
        })
    }

    fn feed(entries: Vec<(&str, Vec<Value>)>) -> NeoFeed {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_transform_projects_fields() {
        let rows = transform(&feed(vec![(
            "2024-05-08",
            vec![neo("2465633", "465633 (2009 JR5)", "18.1279547773", "45290298.225725659")],
        )]))
        .unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.id, 2465633);
        assert_eq!(row.name, "465633 (2009 JR5)");
        assert!(!row.is_potentially_hazardous);
        assert_eq!(row.estimated_diameter_min_km, 0.1);
        assert_eq!(row.estimated_diameter_max_km, 0.25);
        assert_eq!(row.relative_velocity_km_sec, 18.1279547773);
        assert_eq!(row.miss_distance_km, 45290298.225725659);
        assert_eq!(row.searching_date, NaiveDate::from_ymd_opt(2024, 5, 8).unwrap());
    }

    #[test]
    fn test_transform_uses_first_approach_only() {
        let rows = transform(&feed(vec![("2024-05-08", vec![neo("1", "a", "10", "100")])])).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].relative_velocity_km_sec, 10.0);
        assert_eq!(rows[0].miss_distance_km, 100.0);
    }

    #[test]
    fn test_transform_orders_by_date_key() {
        let rows = transform(&feed(vec![
            ("2024-05-09", vec![neo("2", "b", "1", "1")]),
            ("2024-05-07", vec![neo("1", "a", "1", "1"), neo("3", "c", "1", "1")]),
        ]))
        .unwrap();

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }

    #[test]
    fn test_same_object_on_two_dates_gives_two_rows() {
        let rows = transform(&feed(vec![
            ("2024-05-07", vec![neo("7", "x", "1", "1")]),
            ("2024-05-08", vec![neo("7", "x", "1", "1")]),
        ]))
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_ne!(rows[0].key(), rows[1].key());
    }

    #[test]
    fn test_duplicate_key_keeps_last() {
        let rows = transform(&feed(vec![(
            "2024-05-07",
            vec![neo("7", "first", "1", "1"), neo("8", "other", "1", "1"), neo("7", "second", "1", "1")],
        )]))
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "second");
        assert_eq!(rows[1].name, "other");
    }

    #[test]
    fn test_missing_close_approach_data_fails_whole_table() {
        let mut broken = neo("2", "broken", "1", "1");
        broken.as_object_mut().unwrap().remove("close_approach_data");

        let err = transform(&feed(vec![(
            "2024-05-07",
            vec![neo("1", "fine", "1", "1"), broken],
        )]))
        .unwrap_err();

        assert_eq!(err.kind(), "SchemaFailure");
        assert!(err.to_string().contains("close_approach_data"));
    }

    #[test]
    fn test_empty_close_approach_data_fails() {
        let mut broken = neo("2", "broken", "1", "1");
        broken["close_approach_data"] = json!([]);
        assert!(transform(&feed(vec![("2024-05-07", vec![broken])])).is_err());
    }

    #[test]
    fn test_non_numeric_velocity_fails() {
        let err = transform(&feed(vec![("2024-05-07", vec![neo("1", "a", "fast", "1")])])).unwrap_err();
        assert!(err.to_string().contains("kilometers_per_second"));
    }

    #[test]
    fn test_nan_diameter_fails() {
        let mut raw = neo("1", "a", "1", "1");
        raw["estimated_diameter"]["kilometers"]["estimated_diameter_max"] = json!("NaN");
        let err = transform(&feed(vec![("2024-05-07", vec![raw])])).unwrap_err();
        assert!(err.to_string().contains("estimated_diameter_max"));
    }

    #[test]
    fn test_infinite_distance_fails() {
        let err = transform(&feed(vec![("2024-05-07", vec![neo("1", "a", "1", "inf")])])).unwrap_err();
        assert_eq!(err.kind(), "SchemaFailure");
    }

    #[test]
    fn test_columns_match_serialized_header() {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let rows = transform(&feed(vec![("2024-05-07", vec![neo("1", "a", "1", "1")])])).unwrap();
        writer.serialize(&rows[0]).unwrap();
        let content = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(content.lines().next().unwrap(), COLUMNS.join(","));
    }

    #[test]
    fn test_malformed_date_key_fails() {
        let err = transform(&feed(vec![("08/05/2024", vec![neo("1", "a", "1", "1")])])).unwrap_err();
        assert!(err.to_string().contains("08/05/2024"));
    }

    #[test]
    fn test_numeric_id_accepted() {
        let mut raw = neo("1", "a", "1", "1");
        raw["id"] = json!(3542519);
        let rows = transform(&feed(vec![("2024-05-07", vec![raw])])).unwrap();
        assert_eq!(rows[0].id, 3542519);
    }

    #[test]
    fn test_empty_feed_gives_empty_table() {
        assert!(transform(&NeoFeed::new()).unwrap().is_empty());
    }
}
