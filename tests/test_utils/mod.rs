//! Test utilities shared by the integration tests.
//!
//! In-memory SQLite databases with migrations applied, a scripted [`OutageSource`], and an
//! [`AppState`] builder for router tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use serde_json::Value;
use umbral::config::AppConfig;
use umbral::regions::Region;
use umbral::server::AppState;
use umbral::signals::{Datasource, TimeWindow};
use umbral::upstream::{
    OutageSource, RawSeries, UpstreamError, UpstreamResponse, validate_passthrough_path,
};
use umbral::votes::{MemoryVoteStore, VoteSalt, VoteService, VoteStore};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    // Every pooled connection to `:memory:` would see its own empty database.
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await?;

    Migrator::up(&db, None).await?;

    // Fixtures may insert log rows without a parent poll.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = OFF".to_string(),
    ))
    .await?;

    Ok(db)
}

/// Sets up an in-memory SQLite database and returns it behind an Arc.
#[allow(dead_code)]
pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    Ok(Arc::new(setup_test_db().await?))
}

/// Regions `A`, `B`, `C` with matching external codes.
#[allow(dead_code)]
pub fn test_regions() -> Vec<Region> {
    vec![
        Region::new("C", "Charlie", "C"),
        Region::new("A", "Alpha", "A"),
        Region::new("B", "Bravo", "B"),
    ]
}

/// Outage source answering from fixed per-region scores. Regions without a score fail with
/// HTTP 503; passthrough answers with `passthrough` or the given upstream status.
#[derive(Default)]
#[allow(dead_code)]
pub struct ScriptedSource {
    pub scores: HashMap<String, f64>,
    pub passthrough: Option<Result<Value, u16>>,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedSource {
    pub fn with_scores(scores: &[(&str, f64)]) -> Self {
        Self {
            scores: scores
                .iter()
                .map(|(code, score)| (code.to_string(), *score))
                .collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, region: &Region) -> Result<f64, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.scores
            .get(&region.external_code)
            .copied()
            .ok_or(UpstreamError::Status {
                status: 503,
                body: None,
            })
    }
}

#[async_trait]
impl OutageSource for ScriptedSource {
    async fn region_signals(
        &self,
        region: &Region,
        datasource: Datasource,
        window: TimeWindow,
    ) -> Result<RawSeries, UpstreamError> {
        let score = self.lookup(region)?;
        Ok(RawSeries {
            datasource: datasource.as_str().to_string(),
            from: window.from,
            step: 300,
            values: vec![Some(score), None],
        })
    }

    async fn region_outage_score(
        &self,
        region: &Region,
        _window: TimeWindow,
    ) -> Result<f64, UpstreamError> {
        self.lookup(region)
    }

    async fn passthrough(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<UpstreamResponse, UpstreamError> {
        validate_passthrough_path(path)?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.passthrough {
            Some(Ok(body)) => Ok(UpstreamResponse {
                status: 200,
                body: serde_json::json!({ "path": path, "query": query, "body": body }),
            }),
            Some(Err(status)) => Err(UpstreamError::Status {
                status: *status,
                body: Some("upstream exploded".to_string()),
            }),
            None => Err(UpstreamError::Transport("connection refused".to_string())),
        }
    }
}

/// Application state over a scripted source and the in-memory vote store.
#[allow(dead_code)]
pub fn test_state(source: Arc<ScriptedSource>, config: AppConfig) -> AppState {
    let store: Arc<dyn VoteStore> = Arc::new(MemoryVoteStore::new());
    AppState {
        config: Arc::new(config),
        source,
        regions: Arc::new(test_regions()),
        votes: Arc::new(VoteService::new(store, VoteSalt::new("test-salt"))),
        db: None,
    }
}
