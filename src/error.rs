//! Error types for the extract, transform and load stages.

use thiserror::Error;

/// Errors a pipeline stage can end with.
///
/// Stage functions return these; the pipeline logs them and carries on
/// with an empty result for the failed stage.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Network or protocol failure talking to the feed
    #[error("feed request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The feed answered with a non-2xx status
    #[error("feed returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Payload is missing a field or has a value of the wrong type
    #[error("malformed feed payload: {0}")]
    Schema(String),

    /// Table is empty or degenerate for one of the metrics
    #[error("cannot compute metrics: {0}")]
    Metrics(String),

    /// Could not open a warehouse connection
    #[error("warehouse connection failed: {0}")]
    Connection(#[source] sqlx::Error),

    /// Schema bootstrap or read query failed
    #[error("warehouse query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// Upsert of the transformed rows failed
    #[error("warehouse load failed: {0}")]
    Load(#[source] sqlx::Error),

    /// Reading or writing a JSON/CSV artifact failed
    #[error("artifact '{path}' failed: {message}")]
    Snapshot { path: String, message: String },

    /// Invalid settings
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EtlError {
    /// Taxonomy name, logged as the `kind` field of stage errors.
    pub fn kind(&self) -> &'static str {
        match self {
            EtlError::Transport(_) | EtlError::HttpStatus { .. } => "TransportFailure",
            EtlError::Schema(_) => "SchemaFailure",
            EtlError::Metrics(_) => "MetricsFailure",
            EtlError::Connection(_) => "ConnectionFailure",
            EtlError::Query(_) => "QueryFailure",
            EtlError::Load(_) => "LoadFailure",
            EtlError::Snapshot { .. } => "SnapshotFailure",
            EtlError::Config(_) => "ConfigFailure",
        }
    }

    pub(crate) fn snapshot(path: impl AsRef<std::path::Path>, err: impl std::fmt::Display) -> Self {
        EtlError::Snapshot {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }
}
