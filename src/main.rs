//! # Umbral Main Entry Point

use std::sync::Arc;

use anyhow::Context;
use umbral::{
    config::ConfigLoader,
    db,
    regions::load_regions,
    server::{AppState, run_server},
    telemetry::init_tracing,
    upstream::{IodaClient, OutageSource},
    votes::{DatabaseVoteStore, MemoryVoteStore, VoteSalt, VoteService, VoteStore},
};

/// Salt used when no `UMBRAL_VOTE_SALT` is set (only allowed in local/test profiles).
const DEV_VOTE_SALT: &str = "umbral-local-development-salt";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::new()
        .load()
        .context("Failed to load configuration")?;

    init_tracing(&config)?;
    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let regions = load_regions(config.regions_file.as_deref()).context("Failed to load regions")?;
    tracing::info!(count = regions.len(), "Loaded regions");

    let source: Arc<dyn OutageSource> =
        Arc::new(IodaClient::from_config(&config).context("Failed to build upstream client")?);

    let salt = match config.vote_salt.as_deref().filter(|s| !s.is_empty()) {
        Some(salt) => VoteSalt::new(salt),
        None => {
            tracing::warn!("UMBRAL_VOTE_SALT not set; using the development salt");
            VoteSalt::new(DEV_VOTE_SALT)
        }
    };

    let database = if config.has_database() {
        let conn = db::init_pool(&config).await?;
        db::run_migrations(&conn).await?;
        Some(conn)
    } else {
        tracing::warn!("No database configured; votes are kept in memory and lost on restart");
        None
    };
    let store: Arc<dyn VoteStore> = match &database {
        Some(conn) => Arc::new(DatabaseVoteStore::new(Arc::new(conn.clone()))),
        None => Arc::new(MemoryVoteStore::new()),
    };

    let config = Arc::new(config);
    let state = AppState {
        config: Arc::clone(&config),
        source,
        regions: Arc::new(regions),
        votes: Arc::new(VoteService::new(store, salt)),
        db: database,
    };

    run_server(config, state).await
}
