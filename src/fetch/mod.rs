//! Extract stage: pull the near-earth-object feed for a date window.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::EtlError;
use crate::window::FeedWindow;

/// The feed's `near_earth_objects` field: date key (`YYYY-MM-DD`) to the raw
/// object records listed under that date. Ordered by date.
pub type NeoFeed = BTreeMap<String, Vec<Value>>;

const MAX_ERROR_BODY: usize = 512;

/// Requests the feed for `window` and returns its `near_earth_objects` map.
///
/// Authentication is the client's job (see [`auth::UrlParam`]).
///
/// # Errors
///
/// [`EtlError::Transport`] on network failure, [`EtlError::HttpStatus`] on a
/// non-2xx answer and [`EtlError::Schema`] when the body is not JSON or lacks
/// the `near_earth_objects` map.
pub async fn fetch_feed<C: HttpClient>(
    client: &C,
    feed_url: &str,
    window: &FeedWindow,
) -> Result<NeoFeed, EtlError> {
    let mut url: reqwest::Url = feed_url
        .parse()
        .map_err(|e| EtlError::Config(format!("invalid feed url '{feed_url}': {e}")))?;
    url.query_pairs_mut()
        .append_pair("start_date", &window.start_param())
        .append_pair("end_date", &window.end_param());

    let req = reqwest::Request::new(reqwest::Method::GET, url);
    let resp = client.execute(req).await?;

    let status = resp.status();
    if !status.is_success() {
        let mut body = resp.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            body.truncate(cut);
        }
        return Err(EtlError::HttpStatus {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = resp.bytes().await?;
    debug!(bytes = bytes.len(), "Feed body received");
    let body: Value = serde_json::from_slice(&bytes)
        .map_err(|e| EtlError::Schema(format!("feed body is not JSON: {e}")))?;
    extract_near_earth_objects(body)
}

/// Pulls the `near_earth_objects` map out of a full feed response.
pub fn extract_near_earth_objects(mut body: Value) -> Result<NeoFeed, EtlError> {
    let objects = body
        .get_mut("near_earth_objects")
        .map(Value::take)
        .ok_or_else(|| EtlError::Schema("response has no 'near_earth_objects' field".to_string()))?;

    serde_json::from_value(objects).map_err(|e| {
        EtlError::Schema(format!("'near_earth_objects' is not a map of date to records: {e}"))
    })
}

/// Loads a raw snapshot previously written by the extract stage, for replay.
///
/// Accepts either the bare `near_earth_objects` map or a full feed response.
pub fn load_snapshot(path: &Path) -> Result<NeoFeed, EtlError> {
    let content = std::fs::read_to_string(path).map_err(|e| EtlError::snapshot(path, e))?;
    let value: Value = serde_json::from_str(&content).map_err(|e| EtlError::snapshot(path, e))?;

    if value.get("near_earth_objects").is_some() {
        return extract_near_earth_objects(value);
    }
    serde_json::from_value(value).map_err(|e| EtlError::snapshot(path, e))
}
