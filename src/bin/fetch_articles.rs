use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use news_aggregator::config;
use news_aggregator::db;
use news_aggregator::fetcher::Fetcher;
use news_aggregator::providers;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Fetch articles from every enabled provider once and exit"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.database_url());
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let http = providers::build_http_client()?;
    let fetcher = Fetcher::new(pool, providers::registry(&cfg, http)?);
    info!(providers = ?fetcher.provider_names(), "fetching articles");

    let report = fetcher.fetch_and_store().await;
    for p in &report.providers {
        println!(
            "{:<10} fetched={:<4} saved={:<4} failed={}",
            p.provider, p.fetched, p.saved, p.failed
        );
    }
    println!(
        "total      fetched={:<4} saved={:<4} failed={}",
        report.fetched(),
        report.saved(),
        report.failed()
    );
    Ok(())
}
