//! # Outage Dashboard Handlers
//!
//! Region-level signal and outage aggregations, plus a generic passthrough to the upstream
//! statistics API.

use std::sync::Arc;

use axum::{
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Deserialize;
use utoipa::IntoParams;

use super::public_cache_headers;
use crate::error::{ApiError, provider_error, validation_error};
use crate::server::AppState;
use crate::signals::{
    self, Datasource, OutageScoreBatch, SignalBatch, TimeWindow, clamp_hours,
};
use crate::upstream::{UPSTREAM_NAME, UpstreamError};

/// Query parameters for the raw signal aggregation
#[derive(Debug, Deserialize, IntoParams)]
pub struct SignalsQuery {
    /// `bgp` (default), `ping-slash24` or `merit-nt`
    pub datasource: Option<String>,
    /// Lookback in hours, clamped to 1..=168 (default: 24)
    pub hours: Option<i64>,
}

/// Query parameters for the outage aggregation
#[derive(Debug, Deserialize, IntoParams)]
pub struct OutagesQuery {
    /// Lookback in hours, clamped to 1..=168 (default: 24)
    pub hours: Option<i64>,
}

/// Raw signals for every region
#[utoipa::path(
    get,
    path = "/api/ioda/signals",
    params(SignalsQuery),
    responses(
        (status = 200, description = "Signals for every region that answered; failures named in `error`", body = SignalBatch),
        (status = 400, description = "Unknown datasource or non-numeric hours", body = ApiError)
    ),
    tag = "ioda"
)]
pub async fn region_signals(
    State(state): State<AppState>,
    query: Result<Query<SignalsQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;

    let datasource = match query.datasource.as_deref() {
        None | Some("") => Datasource::default(),
        Some(raw) => raw.parse::<Datasource>().map_err(|message| {
            validation_error(&message, serde_json::json!({ "datasource": raw }))
        })?,
    };
    let window = TimeWindow::lookback(Utc::now(), clamp_hours(query.hours));

    let batch = signals::collect_region_signals(
        Arc::clone(&state.source),
        &state.regions,
        datasource,
        window,
        state.fanout_settings(),
    )
    .await;

    Ok((public_cache_headers(), Json(batch)).into_response())
}

/// Outage scores for every region, worst first
#[utoipa::path(
    get,
    path = "/api/ioda/outages",
    params(OutagesQuery),
    responses(
        (status = 200, description = "Scores for every region; failed regions score 0", body = OutageScoreBatch),
        (status = 400, description = "Non-numeric hours", body = ApiError)
    ),
    tag = "ioda"
)]
pub async fn region_outages(
    State(state): State<AppState>,
    query: Result<Query<OutagesQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let window = TimeWindow::lookback(Utc::now(), clamp_hours(query.hours));

    let batch = signals::collect_outage_scores(
        Arc::clone(&state.source),
        &state.regions,
        window,
        state.fanout_settings(),
    )
    .await;

    Ok((public_cache_headers(), Json(batch)).into_response())
}

/// Forward a GET to the upstream API
///
/// Every query parameter except `path` is passed through unchanged.
#[utoipa::path(
    get,
    path = "/api/ioda",
    params(
        ("path" = String, Query, description = "Upstream path, e.g. /signals/raw/country/VE")
    ),
    responses(
        (status = 200, description = "Upstream JSON body", body = serde_json::Value),
        (status = 400, description = "Missing or unsafe path", body = ApiError),
        (status = 502, description = "Upstream failed", body = ApiError)
    ),
    tag = "ioda"
)]
pub async fn proxy(
    State(state): State<AppState>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = query?;

    let (path_params, forwarded): (Vec<_>, Vec<_>) =
        params.into_iter().partition(|(key, _)| key == "path");
    let path = path_params
        .into_iter()
        .map(|(_, value)| value)
        .next()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            validation_error(
                "path query parameter is required",
                serde_json::json!({ "path": "Required parameter is missing" }),
            )
        })?;

    let response = state
        .source
        .passthrough(&path, &forwarded)
        .await
        .map_err(upstream_api_error)?;

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    Ok((status, public_cache_headers(), Json(response.body)).into_response())
}

fn upstream_api_error(error: UpstreamError) -> ApiError {
    match error {
        UpstreamError::Status { status, body } => {
            provider_error(UPSTREAM_NAME.to_string(), status, body)
        }
        UpstreamError::InvalidPath(reason) => validation_error(
            "path is not an allowed upstream path",
            serde_json::json!({ "path": reason }),
        ),
        UpstreamError::Timeout(ms) => ApiError::new(
            StatusCode::GATEWAY_TIMEOUT,
            "UPSTREAM_TIMEOUT",
            &format!("Upstream did not answer within {} ms", ms),
        )
        .with_retry_after(30),
        other => {
            tracing::warn!(error = %other, "Passthrough request failed");
            ApiError::new(
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_UNAVAILABLE",
                "Upstream request failed",
            )
        }
    }
}
