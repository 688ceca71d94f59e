//! Command-line and environment configuration.
//!
//! Every option can come from the environment, so the scheduled job runs
//! without arguments. Connection settings fall back to a JSON credentials
//! file, then to built-in defaults.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};
use sqlx::postgres::PgConnectOptions;
use tracing::warn;

use crate::credentials::Credentials;
use crate::warehouse::{DEFAULT_TABLE, validate_table_name};

pub const DEFAULT_FEED_URL: &str = "https://api.nasa.gov/neo/rest/v1/feed";

/// NASA's rate-limited public key.
pub const DEMO_API_KEY: &str = "DEMO_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WarehouseBackend {
    /// PostgreSQL at --db-host
    Postgres,
    /// In-process table, discarded at exit
    Memory,
}

#[derive(Parser)]
#[command(name = "neo_etl")]
#[command(about = "Load near-earth objects from the NeoWs feed into the warehouse", long_about = None)]
pub struct Config {
    /// Feed endpoint
    #[arg(long, env = "NEO_FEED_URL", default_value = DEFAULT_FEED_URL)]
    pub feed_url: String,

    /// Feed API key [default: DEMO_KEY]
    #[arg(long, env = "NEO_FEED_API_KEY", hide_env_values = true)]
    pub feed_api_key: Option<String>,

    /// Warehouse host [default: localhost]
    #[arg(long, env = "NEO_DB_HOST")]
    pub db_host: Option<String>,

    /// Warehouse port [default: 5432]
    #[arg(long, env = "NEO_DB_PORT")]
    pub db_port: Option<u16>,

    /// Warehouse user [default: postgres]
    #[arg(long, env = "NEO_DB_USER")]
    pub db_user: Option<String>,

    #[arg(long, env = "NEO_DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    /// Warehouse database [default: postgres]
    #[arg(long, env = "NEO_DB_NAME")]
    pub db_name: Option<String>,

    /// Target table
    #[arg(long, env = "NEO_DB_TABLE", default_value = DEFAULT_TABLE)]
    pub db_table: String,

    /// JSON file with any of feed_api_key, db_host, db_port, db_user, db_password, db_name
    #[arg(long, env = "NEO_CREDENTIALS_FILE", value_name = "FILE")]
    pub credentials: Option<PathBuf>,

    /// Days covered, ending today
    #[arg(long, env = "NEO_WINDOW_DAYS", default_value_t = 3)]
    pub window_days: u32,

    /// Directory for the raw JSON and CSV snapshots
    #[arg(long, env = "NEO_ARTIFACTS_DIR", default_value = ".")]
    pub artifacts_dir: PathBuf,

    /// Replay a raw JSON snapshot instead of calling the feed
    #[arg(long, env = "NEO_FROM_SNAPSHOT", value_name = "FILE")]
    pub from_snapshot: Option<PathBuf>,

    /// Lower miss-distance bound (km, inclusive) of the example query
    #[arg(long, env = "NEO_QUERY_DISTANCE_FROM", default_value_t = 25_000_000.0)]
    pub query_distance_from: f64,

    /// Upper miss-distance bound (km, exclusive) of the example query
    #[arg(long, env = "NEO_QUERY_DISTANCE_TO", default_value_t = 50_000_000.0)]
    pub query_distance_to: f64,

    #[arg(long, env = "NEO_WAREHOUSE", value_enum, default_value_t = WarehouseBackend::Postgres)]
    pub warehouse: WarehouseBackend,
}

/// Warehouse connection settings after defaults are applied.
#[derive(Clone, PartialEq, Eq)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub name: String,
    pub table: String,
}

impl DbSettings {
    pub fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.name);
        match &self.password {
            Some(password) => options.password(password),
            None => options,
        }
    }
}

impl std::fmt::Debug for DbSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("name", &self.name)
            .field("table", &self.table)
            .finish()
    }
}

/// Validated settings for one run.
#[derive(Clone)]
pub struct Settings {
    pub feed_url: String,
    pub feed_api_key: String,
    pub db: DbSettings,
    pub backend: WarehouseBackend,
    pub window_days: u32,
    pub artifacts_dir: PathBuf,
    pub from_snapshot: Option<PathBuf>,
    pub query_distance_from: f64,
    pub query_distance_to: f64,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("feed_url", &self.feed_url)
            .field("feed_api_key", &"***")
            .field("db", &self.db)
            .field("backend", &self.backend)
            .field("window_days", &self.window_days)
            .field("artifacts_dir", &self.artifacts_dir)
            .field("from_snapshot", &self.from_snapshot)
            .field("query_distance_from", &self.query_distance_from)
            .field("query_distance_to", &self.query_distance_to)
            .finish()
    }
}

impl Config {
    /// Merges the credentials file, applies defaults and validates.
    ///
    /// # Errors
    ///
    /// Fails on an unreadable credentials file, an empty window, an empty or
    /// inverted query distance range, or an unsafe table name.
    pub fn resolve(self) -> Result<Settings> {
        let file = match &self.credentials {
            Some(path) => Credentials::load(path)?,
            None => Credentials::default(),
        };

        if self.window_days == 0 {
            bail!("window must cover at least one day");
        }
        // also rejects NaN bounds
        if !(self.query_distance_from < self.query_distance_to) {
            bail!(
                "query distance range [{}, {}) is empty",
                self.query_distance_from,
                self.query_distance_to
            );
        }
        validate_table_name(&self.db_table)?;

        let feed_api_key = match self.feed_api_key.or(file.feed_api_key) {
            Some(key) => key,
            None => {
                warn!("No feed API key configured, falling back to {DEMO_API_KEY}");
                DEMO_API_KEY.to_string()
            }
        };

        Ok(Settings {
            feed_url: self.feed_url,
            feed_api_key,
            db: DbSettings {
                host: self.db_host.or(file.db_host).unwrap_or_else(|| "localhost".to_string()),
                port: self.db_port.or(file.db_port).unwrap_or(5432),
                user: self.db_user.or(file.db_user).unwrap_or_else(|| "postgres".to_string()),
                password: self.db_password.or(file.db_password),
                name: self.db_name.or(file.db_name).unwrap_or_else(|| "postgres".to_string()),
                table: self.db_table,
            },
            backend: self.warehouse,
            window_days: self.window_days,
            artifacts_dir: self.artifacts_dir,
            from_snapshot: self.from_snapshot,
            query_distance_from: self.query_distance_from,
            query_distance_to: self.query_distance_to,
        })
    }
}
