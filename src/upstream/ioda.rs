//! HTTP client for the IODA outage statistics API.

use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{
    OutageSource, RawSeries, ResponseCache, UpstreamError, UpstreamResponse,
    validate_passthrough_path,
};
use crate::config::AppConfig;
use crate::regions::Region;
use crate::signals::{Datasource, TimeWindow};

/// IODA v2 client with an in-process response cache.
pub struct IodaClient {
    http: reqwest::Client,
    base_url: String,
    cache: ResponseCache,
}

impl IodaClient {
    /// Build a client from explicit settings.
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        cache: ResponseCache,
    ) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("umbral/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache,
        })
    }

    /// Build a client from the application configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, UpstreamError> {
        Self::new(
            config.upstream_base_url.clone(),
            Duration::from_millis(config.upstream.timeout_ms),
            ResponseCache::new(
                config.upstream.cache_capacity,
                Duration::from_secs(config.upstream.cache_ttl_seconds),
            ),
        )
    }

    fn build_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, UpstreamError> {
        let raw = format!("{}{}", self.base_url, path);
        let parsed = if query.is_empty() {
            Url::parse(&raw)
        } else {
            Url::parse_with_params(&raw, query)
        };
        parsed.map_err(|e| UpstreamError::InvalidPath(format!("{}: {}", raw, e)))
    }

    /// GET `url` and return `(status, body)`. Only 2xx bodies are cached.
    async fn get_json(&self, url: Url) -> Result<(u16, Value), UpstreamError> {
        let key = url.to_string();
        if let Some(hit) = self.cache.get(&key).await {
            debug!(url = %key, status = hit.0, "Upstream cache hit");
            counter!("umbral_upstream_cache_hits_total").increment(1);
            return Ok(hit);
        }

        counter!("umbral_upstream_requests_total").increment(1);
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .inspect_err(|_| counter!("umbral_upstream_failures_total").increment(1))?;

        let status = response.status();
        if !status.is_success() {
            counter!("umbral_upstream_failures_total").increment(1);
            let body = response.text().await.ok().filter(|b| !b.is_empty());
            warn!(url = %key, status = status.as_u16(), "Upstream returned non-success status");
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await.map_err(|e| {
            counter!("umbral_upstream_failures_total").increment(1);
            UpstreamError::Decode(e.to_string())
        })?;

        self.cache.insert(key, status.as_u16(), body.clone()).await;
        Ok((status.as_u16(), body))
    }
}

#[async_trait]
impl OutageSource for IodaClient {
    #[instrument(skip(self, region), fields(region = %region.code))]
    async fn region_signals(
        &self,
        region: &Region,
        datasource: Datasource,
        window: TimeWindow,
    ) -> Result<RawSeries, UpstreamError> {
        let from = window.from.to_string();
        let until = window.until.to_string();
        let url = self.build_url(
            &format!("/signals/raw/region/{}", region.external_code),
            &[
                ("from", from.as_str()),
                ("until", until.as_str()),
                ("datasource", datasource.as_str()),
            ],
        )?;

        let (_, body) = self.get_json(url).await?;
        first_series(&body)
    }

    #[instrument(skip(self, region), fields(region = %region.code))]
    async fn region_outage_score(
        &self,
        region: &Region,
        window: TimeWindow,
    ) -> Result<f64, UpstreamError> {
        let from = window.from.to_string();
        let until = window.until.to_string();
        let url = self.build_url(
            "/outages/summary",
            &[
                ("entityType", "region"),
                ("entityCode", region.external_code.as_str()),
                ("from", from.as_str()),
                ("until", until.as_str()),
            ],
        )?;

        let (_, body) = self.get_json(url).await?;
        summary_score(&body)
    }

    #[instrument(skip(self, query))]
    async fn passthrough(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<UpstreamResponse, UpstreamError> {
        validate_passthrough_path(path)?;

        let pairs: Vec<(&str, &str)> = query
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let url = self.build_url(path, &pairs)?;

        let (status, body) = self.get_json(url).await?;
        Ok(UpstreamResponse { status, body })
    }
}

fn data_array(body: &Value) -> Result<&Vec<Value>, UpstreamError> {
    body.get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| UpstreamError::Decode("response has no 'data' array".to_string()))
}

/// The raw-signal endpoint nests series one level deep (`data: [[series, ...]]`); older
/// deployments return them flat. Either way the first series wins.
fn first_series(body: &Value) -> Result<RawSeries, UpstreamError> {
    let series = data_array(body)?
        .iter()
        .flat_map(|entry| match entry {
            Value::Array(inner) => inner.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .next()
        .ok_or_else(|| UpstreamError::Decode("no series returned".to_string()))?;

    serde_json::from_value(series.clone()).map_err(|e| UpstreamError::Decode(e.to_string()))
}

/// Sum of `scores.overall` across summary entries; an empty summary means no outage.
fn summary_score(body: &Value) -> Result<f64, UpstreamError> {
    Ok(data_array(body)?
        .iter()
        .filter_map(|entry| entry.pointer("/scores/overall").and_then(Value::as_f64))
        .sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_series_nested_and_flat() {
        let nested = json!({"data": [[{"datasource": "bgp", "from": 10, "step": 300, "values": [1, 2]}]]});
        let flat = json!({"data": [{"datasource": "bgp", "from": 10, "step": 300, "values": [1, 2]}]});

        let expected = RawSeries {
            datasource: "bgp".to_string(),
            from: 10,
            step: 300,
            values: vec![Some(1.0), Some(2.0)],
        };
        assert_eq!(first_series(&nested).unwrap(), expected);
        assert_eq!(first_series(&flat).unwrap(), expected);
    }

    #[test]
    fn test_first_series_empty_is_error() {
        assert!(matches!(
            first_series(&json!({"data": [[]]})),
            Err(UpstreamError::Decode(msg)) if msg.contains("no series")
        ));
        assert!(first_series(&json!({"error": "nope"})).is_err());
    }

    #[test]
    fn test_summary_score_sums_overall() {
        let body = json!({"data": [
            {"scores": {"overall": 1200.5, "bgp": 3.0}},
            {"scores": {"overall": 800}},
            {"scores": {}}
        ]});
        assert_eq!(summary_score(&body).unwrap(), 2000.5);
        assert_eq!(summary_score(&json!({"data": []})).unwrap(), 0.0);
    }
}
