use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use news_aggregator::config;
use news_aggregator::db;
use news_aggregator::preferences::{self, Caller};

#[derive(Debug, Parser)]
#[command(author, version, about = "Inspect and edit a user's feed preferences")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Authenticated user id
    #[arg(long)]
    as_user: Option<i64>,

    /// Fallback user id when no authenticated user resolves
    #[arg(long)]
    user_id: Option<i64>,

    /// Create (or reuse) a user with this email before running the command
    #[arg(long, value_name = "EMAIL")]
    ensure_user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Show,
    /// Replace preferred sources
    Sources { ids: Vec<i64> },
    /// Replace preferred categories
    Categories { ids: Vec<i64> },
    /// Replace preferred authors
    Authors { names: Vec<String> },
    /// Remove every preference
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.database_url());
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let mut caller = Caller {
        authenticated: args.as_user,
        user_id: args.user_id,
    };
    if let Some(email) = args.ensure_user.as_deref() {
        let name = email.split('@').next().unwrap_or(email);
        let id = db::get_or_create_user(&pool, email, name).await?;
        eprintln!("user {email} has id {id}");
        caller.authenticated = caller.authenticated.or(Some(id));
    }

    let prefs = match args.command {
        Command::Show => preferences::show(&pool, caller).await?,
        Command::Sources { ids } => preferences::update_sources(&pool, caller, &ids).await?,
        Command::Categories { ids } => preferences::update_categories(&pool, caller, &ids).await?,
        Command::Authors { names } => preferences::update_authors(&pool, caller, &names).await?,
        Command::Clear => {
            preferences::clear(&pool, caller).await?;
            println!("preferences cleared");
            return Ok(());
        }
    };
    println!("{}", serde_json::to_string_pretty(&prefs)?);
    Ok(())
}
