use anyhow::{Context, Result, bail};
use clap::Parser;
use umbral::{config::ConfigLoader, db, repositories::PollRepository};

#[derive(Parser)]
#[command(name = "create_poll")]
#[command(about = "Create a scenario poll in the vote database", long_about = None)]
struct Cli {
    /// Poll identifier used in /api/polls/{id}/votes
    #[arg(long)]
    id: String,
    /// Question shown above the scenarios
    #[arg(long)]
    title: String,
    /// Apply pending migrations first
    #[arg(long, default_value_t = false)]
    migrate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let id = cli.id.trim();
    if id.is_empty() {
        bail!("poll id must not be empty");
    }

    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;
    if !config.has_database() {
        bail!("UMBRAL_DATABASE_URL is not set; polls only persist in a database");
    }

    let conn = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;
    if cli.migrate {
        db::run_migrations(&conn).await?;
    }

    let polls = PollRepository::new(std::sync::Arc::new(conn));
    if polls.find_by_id(id).await?.is_some() {
        bail!("poll '{}' already exists", id);
    }

    let poll = polls
        .create(id, cli.title.trim())
        .await
        .context("creating poll")?;

    println!("Created poll '{}' ({})", poll.id, poll.title);
    Ok(())
}
