//! # Server Configuration
//!
//! This module contains the server setup and configuration for the Umbral API.

use std::any::Any;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router, middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use sea_orm::DatabaseConnection;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::error::{ApiError, ErrorType};
use crate::fanout::FanOutSettings;
use crate::handlers;
use crate::regions::Region;
use crate::telemetry::trace_context_middleware;
use crate::upstream::OutageSource;
use crate::votes::VoteService;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Upstream outage statistics
    pub source: Arc<dyn OutageSource>,
    /// Regions every aggregation covers
    pub regions: Arc<Vec<Region>>,
    pub votes: Arc<VoteService>,
    /// `None` when votes are kept in memory
    pub db: Option<DatabaseConnection>,
}

impl AppState {
    /// Fan-out tuning derived from the upstream configuration.
    pub fn fanout_settings(&self) -> FanOutSettings {
        FanOutSettings::from(&self.config.upstream)
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/ioda", get(handlers::ioda::proxy))
        .route("/api/ioda/signals", get(handlers::ioda::region_signals))
        .route("/api/ioda/outages", get(handlers::ioda::region_outages))
        .route(
            "/api/polls/{id}/votes",
            get(handlers::votes::poll_tally).post(handlers::votes::cast_vote),
        )
        .route("/api/cron/warm-cache", get(handlers::cron::warm_cache));

    let app = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .merge(api)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()));

    with_request_layers(app)
}

/// Wraps a router in the request-level middleware stack.
///
/// The panic boundary sits inside the trace context so its 500 carries the request's trace id.
pub(crate) fn with_request_layers(router: Router) -> Router {
    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    tracing::error!(panic = %detail, "Request handler panicked");

    ApiError::from(ErrorType::InternalServerError).into_response()
}

/// Starts the server and serves until Ctrl-C / SIGTERM
pub async fn run_server(config: Arc<AppConfig>, state: AppState) -> Result<()> {
    let app = create_app(state);

    let addr = config
        .bind_addr()
        .with_context(|| format!("Invalid server address: {}", config.api_bind_addr))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, profile = %config.profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

struct CronSecurity;

impl Modify for CronSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::ioda::region_signals,
        crate::handlers::ioda::region_outages,
        crate::handlers::ioda::proxy,
        crate::handlers::votes::cast_vote,
        crate::handlers::votes::poll_tally,
        crate::handlers::cron::warm_cache,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::error::ApiError,
            crate::error::ProviderError,
            crate::signals::Datasource,
            crate::signals::Severity,
            crate::signals::RegionSignal,
            crate::signals::SignalBatch,
            crate::signals::StateOutageScore,
            crate::signals::OutageScoreBatch,
            crate::handlers::votes::CastVoteRequest,
            crate::votes::VoteOutcome,
            crate::votes::PollTally,
            crate::votes::ScenarioCount,
            crate::handlers::cron::WarmCacheReport,
            crate::handlers::cron::WarmedBatch,
        )
    ),
    modifiers(&CronSecurity),
    tags(
        (name = "root", description = "Service information and health"),
        (name = "ioda", description = "Region-level internet outage aggregations"),
        (name = "votes", description = "Scenario polls"),
        (name = "cron", description = "Scheduled maintenance"),
    ),
    info(
        title = "Umbral API",
        description = "Regional internet outage dashboard and scenario polls",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn exploding_handler() -> &'static str {
        panic!("handler bug")
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_problem_json_500() {
        let app = with_request_layers(Router::new().route("/explode", get(exploding_handler)));

        let response = app
            .oneshot(Request::get("/explode").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
        let request_id = response.headers().get("x-request-id").unwrap().clone();

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "INTERNAL_SERVER_ERROR");
        assert!(!json["message"].as_str().unwrap().contains("handler bug"));
        assert_eq!(json["trace_id"], request_id.to_str().unwrap());
    }

    #[tokio::test]
    async fn test_request_layers_leave_normal_responses_alone() {
        let app = with_request_layers(Router::new().route("/ok", get(|| async { "fine" })));

        let response = app
            .oneshot(Request::get("/ok").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
