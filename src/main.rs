use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use news_aggregator::config;
use news_aggregator::db;
use news_aggregator::fetcher::Fetcher;
use news_aggregator::providers;

#[derive(Debug, Parser)]
#[command(author, version, about = "Periodically pull news providers into the article store")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override `app.fetch_interval_secs`
    #[arg(long)]
    interval_secs: Option<u64>,
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
    if fetcher.provider_names().is_empty() {
        warn!("no providers enabled; runs will store nothing");
    }

    let every = Duration::from_secs(args.interval_secs.unwrap_or(cfg.app.fetch_interval_secs).max(1));
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(providers = ?fetcher.provider_names(), interval_secs = every.as_secs(), "starting fetch loop");
    // Ctrl-C is only observed between runs; an in-flight fetch finishes first.
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = fetcher.fetch_and_store().await;
                info!(
                    fetched = report.fetched(),
                    saved = report.saved(),
                    failed = report.failed(),
                    "fetch run finished"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    Ok(())
}
