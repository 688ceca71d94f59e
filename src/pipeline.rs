//! Runs extract, transform, metrics and load in order.
//!
//! Each stage gets its own span and logs `START`, `END` and, on failure,
//! `ERROR` with the error kind. A failed stage yields `None`; stages that
//! need its output are skipped, the rest still run.

use std::io::Write;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{Instrument, error, info, info_span, warn};

use crate::config::Settings;
use crate::error::EtlError;
use crate::fetch::{HttpClient, NeoFeed, fetch_feed, load_snapshot};
use crate::metrics::AsteroidMetrics;
use crate::output::{ArtifactPaths, log_metrics, print_metrics, write_raw_snapshot, write_table_snapshot};
use crate::transform::{NeoRecord, transform};
use crate::warehouse::Warehouse;
use crate::window::FeedWindow;

/// What each stage produced. `None` marks a failed or skipped stage.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
    pub fetched_dates: Option<usize>,
    pub rows: Option<usize>,
    pub metrics: Option<AsteroidMetrics>,
    pub schema_ready: bool,
    pub loaded: Option<usize>,
    pub selected: Option<Vec<String>>,
}

impl RunReport {
    /// True when every stage succeeded.
    pub fn is_complete(&self) -> bool {
        self.fetched_dates.is_some()
            && self.rows.is_some()
            && self.metrics.is_some()
            && self.schema_ready
            && self.loaded.is_some()
            && self.selected.is_some()
    }
}

/// Logs the stage outcome and turns a failure into `None`.
fn settle<T>(stage: &'static str, result: Result<T, EtlError>) -> Option<T> {
    match result {
        Ok(value) => {
            info!(stage, "END");
            Some(value)
        }
        Err(e) => {
            error!(stage, kind = e.kind(), error = %e, "ERROR");
            info!(stage, "END");
            None
        }
    }
}

/// Runs one batch for the window ending `today`.
///
/// `out` receives the printed metrics. The run never stops early on a
/// stage failure; inspect the returned report instead.
pub async fn run<C, W, O>(
    settings: &Settings,
    today: NaiveDate,
    client: &C,
    warehouse: &W,
    out: &mut O,
) -> RunReport
where
    C: HttpClient,
    W: Warehouse + ?Sized,
    O: Write,
{
    let mut report = RunReport::default();

    let window = match FeedWindow::trailing(today, settings.window_days) {
        Ok(window) => window,
        Err(e) => {
            error!(kind = e.kind(), error = %e, "Cannot build feed window");
            return report;
        }
    };
    report.window_start = Some(window.start);
    report.window_end = Some(window.end);

    let artifacts = ArtifactPaths::new(&settings.artifacts_dir, settings.window_days);

    let feed = extract(settings, &window, client, &artifacts)
        .instrument(info_span!("extract", start = %window.start, end = %window.end))
        .await;
    report.fetched_dates = feed.as_ref().map(NeoFeed::len);

    let rows = match &feed {
        Some(feed) => info_span!("transform").in_scope(|| load_rows(feed, &artifacts)),
        None => {
            warn!("No feed payload, skipping transform");
            None
        }
    };
    report.rows = rows.as_ref().map(Vec::len);

    report.metrics = match &rows {
        Some(rows) => info_span!("metrics").in_scope(|| {
            info!(stage = "metrics", "START");
            settle("metrics", AsteroidMetrics::from_rows(rows))
        }),
        None => {
            warn!("No table, skipping metrics");
            None
        }
    };
    if let Some(metrics) = &report.metrics {
        log_metrics(metrics);
        if let Err(e) = print_metrics(out, metrics) {
            warn!(error = %e, "Printing metrics failed");
        }
    }

    report.schema_ready = async {
        info!(stage = "ensure_schema", "START");
        settle("ensure_schema", warehouse.ensure_schema().await).is_some()
    }
    .instrument(info_span!("ensure_schema"))
    .await;

    report.loaded = match &rows {
        Some(rows) => {
            async {
                info!(stage = "load", rows = rows.len(), "START");
                settle("load", warehouse.load(rows).await)
            }
            .instrument(info_span!("load"))
            .await
        }
        None => {
            warn!("No table, skipping load");
            None
        }
    };

    report.selected = async {
        info!(stage = "select", "START");
        settle(
            "select",
            warehouse
                .select_by_window_and_distance(
                    window.start,
                    window.end,
                    settings.query_distance_from,
                    settings.query_distance_to,
                )
                .await,
        )
    }
    .instrument(info_span!(
        "select",
        dist_from = settings.query_distance_from,
        dist_to = settings.query_distance_to
    ))
    .await;

    if let Some(names) = &report.selected {
        info!(count = names.len(), names = ?names, "Example query result");
    }

    report
}

async fn extract<C: HttpClient>(
    settings: &Settings,
    window: &FeedWindow,
    client: &C,
    artifacts: &ArtifactPaths,
) -> Option<NeoFeed> {
    info!(stage = "extract", "START");

    let result = match &settings.from_snapshot {
        Some(path) => {
            info!(path = %path.display(), "Replaying raw snapshot");
            load_snapshot(path)
        }
        None => fetch_feed(client, &settings.feed_url, window).await,
    };

    let feed = settle("extract", result)?;
    if settings.from_snapshot.is_none() {
        if let Err(e) = write_raw_snapshot(&artifacts.raw_json, &feed) {
            warn!(kind = e.kind(), error = %e, "Raw snapshot not written");
        }
    }
    Some(feed)
}

fn load_rows(feed: &NeoFeed, artifacts: &ArtifactPaths) -> Option<Vec<NeoRecord>> {
    info!(stage = "transform", dates = feed.len(), "START");
    let rows = transform(feed).and_then(|rows| {
        write_table_snapshot(&artifacts.table_csv, &rows)?;
        Ok(rows)
    });
    settle("transform", rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_complete_needs_every_stage() {
        let mut report = RunReport {
            fetched_dates: Some(1),
            rows: Some(1),
            metrics: Some(AsteroidMetrics {
                potentially_hazardous_count: 1,
                name_with_max_estimated_diam: "x".to_string(),
                min_collision_hours: 1.0,
            }),
            schema_ready: true,
            loaded: Some(1),
            selected: Some(vec![]),
            ..Default::default()
        };
        assert!(report.is_complete());

        report.schema_ready = false;
        assert!(!report.is_complete());
    }

    #[test]
    fn test_default_report_is_incomplete() {
        assert!(!RunReport::default().is_complete());
    }
}
