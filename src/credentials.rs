use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Secrets and connection settings read from a JSON file.
///
/// Every field is optional; values given on the command line or in the
/// environment take precedence.
/// ```json
/// {
///   "feed_api_key": "abc123",
///   "db_host": "warehouse.internal",
///   "db_port": 5432,
///   "db_user": "etl",
///   "db_password": "hunter2",
///   "db_name": "dwh"
/// }
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Credentials {
    pub feed_api_key: Option<String>,
    pub db_host: Option<String>,
    pub db_port: Option<u16>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    pub db_name: Option<String>,
}

impl Credentials {
    /// Loads the credentials from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading credentials file '{}'", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing credentials file '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"feed_api_key": "k", "db_port": 6543}"#).unwrap();

        let creds = Credentials::load(&path).unwrap();
        assert_eq!(creds.feed_api_key.as_deref(), Some("k"));
        assert_eq!(creds.db_port, Some(6543));
        assert_eq!(creds.db_password, None);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"NASA_API": "k"}"#).unwrap();

        let err = Credentials::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("NASA_API"));
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = Credentials::load(Path::new("/nonexistent/creds.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/creds.json"));
    }
}
