//! # Scheduled Cache Warm-Up
//!
//! A cron job calls this endpoint so the upstream cache is filled before dashboard traffic
//! arrives. Callers authenticate with the shared cron secret.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, header::AUTHORIZATION},
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized};
use crate::server::AppState;
use crate::signals::{self, Datasource, TimeWindow, DEFAULT_LOOKBACK_HOURS};

/// Alternative to the bearer header for schedulers that cannot set headers
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct CronQuery {
    pub secret: Option<String>,
}

/// Summary of one aggregation pass
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WarmedBatch {
    /// Regions that produced data
    pub regions: usize,
    /// Joined per-region failures
    pub error: Option<String>,
}

/// Result of a warm-up run
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WarmCacheReport {
    pub signals: WarmedBatch,
    pub outages: WarmedBatch,
    pub elapsed_ms: u64,
}

/// Check the caller against `UMBRAL_CRON_SECRET` in constant time.
///
/// With no secret configured every call is rejected.
pub fn authorize_cron(
    config: &AppConfig,
    headers: &HeaderMap,
    query_secret: Option<&str>,
) -> Result<(), ApiError> {
    let Some(expected) = config.cron_secret.as_deref().filter(|s| !s.is_empty()) else {
        return Err(unauthorized(Some("Cron secret is not configured")));
    };

    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let Some(provided) = bearer.or(query_secret) else {
        return Err(unauthorized(Some("Missing cron secret")));
    };

    if ConstantTimeEq::ct_eq(provided.as_bytes(), expected.as_bytes()).into() {
        Ok(())
    } else {
        Err(unauthorized(Some("Invalid cron secret")))
    }
}

/// Run both region aggregations so their upstream responses are cached
#[utoipa::path(
    get,
    path = "/api/cron/warm-cache",
    params(CronQuery),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Aggregations completed", body = WarmCacheReport),
        (status = 401, description = "Missing or invalid cron secret", body = ApiError)
    ),
    tag = "cron"
)]
pub async fn warm_cache(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CronQuery>,
) -> Result<Json<WarmCacheReport>, ApiError> {
    authorize_cron(&state.config, &headers, query.secret.as_deref())?;

    let started = std::time::Instant::now();
    let window = TimeWindow::lookback(Utc::now(), DEFAULT_LOOKBACK_HOURS);
    let settings = state.fanout_settings();

    let (signal_batch, outage_batch) = tokio::join!(
        signals::collect_region_signals(
            Arc::clone(&state.source),
            &state.regions,
            Datasource::default(),
            window,
            settings,
        ),
        signals::collect_outage_scores(
            Arc::clone(&state.source),
            &state.regions,
            window,
            settings,
        ),
    );

    let report = WarmCacheReport {
        signals: WarmedBatch {
            regions: signal_batch.regions.len(),
            error: signal_batch.error,
        },
        outages: WarmedBatch {
            regions: outage_batch.scores.len(),
            error: outage_batch.error,
        },
        elapsed_ms: started.elapsed().as_millis() as u64,
    };

    info!(
        signals = report.signals.regions,
        outages = report.outages.regions,
        elapsed_ms = report.elapsed_ms,
        "Warmed upstream cache"
    );

    Ok(Json(report))
}
