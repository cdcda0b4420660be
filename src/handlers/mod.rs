//! # API Handlers
//!
//! This module contains all the HTTP endpoint handlers for the Umbral API.

use axum::{
    extract::State,
    http::{StatusCode, header},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db;
use crate::models::ServiceInfo;
use crate::server::AppState;

pub mod cron;
pub mod ioda;
pub mod votes;

/// Shared CDN caching policy for aggregation and proxy responses.
pub const PUBLIC_CACHE_CONTROL: &str = "public, s-maxage=300, stale-while-revalidate=60";

pub(crate) fn public_cache_headers() -> [(header::HeaderName, &'static str); 1] {
    [(header::CACHE_CONTROL, PUBLIC_CACHE_CONTROL)]
}

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Liveness and database status
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    /// `ok`, `unavailable`, or `disabled` when votes are kept in memory
    #[schema(example = "ok")]
    pub database: String,
}

/// Health check; pings the database when one is configured
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    ),
    tag = "root"
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, database) = match &state.db {
        None => (StatusCode::OK, "disabled"),
        Some(conn) => match db::health_check(conn).await {
            Ok(()) => (StatusCode::OK, "ok"),
            Err(err) => {
                tracing::error!(error = %err, "Health check failed");
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
            }
        },
    };

    let body = HealthResponse {
        status: if status.is_success() { "ok" } else { "degraded" }.to_string(),
        database: database.to_string(),
    };
    (status, Json(body))
}
