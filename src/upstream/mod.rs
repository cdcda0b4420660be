//! # Upstream Statistics API
//!
//! The [`OutageSource`] trait is the seam between the aggregation routes and the external
//! internet-outage API. [`IodaClient`] is the HTTP implementation; tests substitute fakes.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::regions::Region;
use crate::signals::{Datasource, TimeWindow};

pub mod cache;
pub mod ioda;

pub use cache::ResponseCache;
pub use ioda::IodaClient;

/// Identifier used for upstream failures in error details and metrics.
pub const UPSTREAM_NAME: &str = "ioda";

/// Errors raised while talking to the upstream API
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Upstream answered with a non-2xx status
    #[error("upstream returned HTTP {status}")]
    Status { status: u16, body: Option<String> },
    /// Network or connectivity failure
    #[error("request failed: {0}")]
    Transport(String),
    /// Body was not the JSON shape we expect
    #[error("malformed response: {0}")]
    Decode(String),
    /// No response within the per-request budget
    #[error("timed out after {0} ms")]
    Timeout(u64),
    /// Passthrough path rejected before any request was made
    #[error("invalid upstream path: {0}")]
    InvalidPath(String),
    /// The request never completed (task aborted or panicked)
    #[error("request aborted: {0}")]
    Aborted(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            UpstreamError::Decode(error.to_string())
        } else {
            UpstreamError::Transport(error.to_string())
        }
    }
}

/// One raw time series for a region.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawSeries {
    pub datasource: String,
    pub from: i64,
    pub step: i64,
    #[serde(default)]
    pub values: Vec<Option<f64>>,
}

/// Status and JSON body of a passthrough request.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

/// Source of region-level outage data.
#[async_trait]
pub trait OutageSource: Send + Sync {
    /// Fetch the raw signal series for one region over `window`.
    async fn region_signals(
        &self,
        region: &Region,
        datasource: Datasource,
        window: TimeWindow,
    ) -> Result<RawSeries, UpstreamError>;

    /// Fetch the aggregate outage score for one region over `window`.
    async fn region_outage_score(
        &self,
        region: &Region,
        window: TimeWindow,
    ) -> Result<f64, UpstreamError>;

    /// Forward a GET to `path` with the given query parameters, unchanged.
    async fn passthrough(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<UpstreamResponse, UpstreamError>;
}

/// Reject passthrough paths that could escape the upstream base URL.
pub fn validate_passthrough_path(path: &str) -> Result<(), UpstreamError> {
    if !path.starts_with('/') || path.starts_with("//") {
        return Err(UpstreamError::InvalidPath(
            "path must start with a single '/'".to_string(),
        ));
    }
    if path.contains("..") || path.contains("://") || path.contains('\\') {
        return Err(UpstreamError::InvalidPath(
            "path must not contain '..', '\\' or a scheme".to_string(),
        ));
    }
    if path.contains('?') || path.contains('#') {
        return Err(UpstreamError::InvalidPath(
            "query parameters must be passed separately".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_path_rules() {
        assert!(validate_passthrough_path("/entities/query").is_ok());
        assert!(validate_passthrough_path("/signals/raw/country/VE").is_ok());

        for bad in [
            "entities",
            "/../admin",
            "//evil.example/x",
            "/http://evil",
            "/a?b=c",
        ] {
            assert!(
                matches!(validate_passthrough_path(bad), Err(UpstreamError::InvalidPath(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_raw_series_tolerates_null_values() {
        let series: RawSeries = serde_json::from_str(
            r#"{"datasource":"bgp","from":100,"step":300,"values":[1.0,null,3.0]}"#,
        )
        .unwrap();
        assert_eq!(series.values, vec![Some(1.0), None, Some(3.0)]);
    }
}
