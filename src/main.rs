//! Batch entry point: one extract-transform-load run over the trailing
//! window, then exit.

use std::ffi::OsStr;
use std::path::Path;

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use neo_etl::config::{Config, WarehouseBackend};
use neo_etl::fetch::{BasicClient, auth::UrlParam};
use neo_etl::pipeline;
use neo_etl::warehouse::{MemoryWarehouse, PostgresWarehouse, Warehouse};
use tracing::{debug, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/neo_etl.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("neo_etl.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let settings = Config::parse().resolve()?;
    let today = Local::now().date_naive();

    info!(
        feed_url = %settings.feed_url,
        window_days = settings.window_days,
        today = %today,
        backend = ?settings.backend,
        db = ?settings.db,
        "neo_etl START"
    );

    let client = UrlParam::api_key(BasicClient::new(), settings.feed_api_key.clone());
    let warehouse: Box<dyn Warehouse> = match settings.backend {
        WarehouseBackend::Postgres => Box::new(PostgresWarehouse::new(
            settings.db.connect_options(),
            &settings.db.table,
        )?),
        WarehouseBackend::Memory => Box::new(MemoryWarehouse::new()),
    };

    let mut stdout = std::io::stdout().lock();
    let report = pipeline::run(&settings, today, &client, warehouse.as_ref(), &mut stdout).await;
    debug!(report = %serde_json::to_string(&report)?, "Run report");

    if report.is_complete() {
        info!("neo_etl END");
        Ok(())
    } else {
        warn!("neo_etl END with failed stages");
        anyhow::bail!("one or more stages failed, see log for details")
    }
}
