use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use news_aggregator::articles;
use news_aggregator::config;
use news_aggregator::db;
use news_aggregator::preferences::Caller;
use news_aggregator::query::ArticleParams;

#[derive(Debug, Parser)]
#[command(author, version, about = "Query stored articles and print them as JSON")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Treat the request as coming from this authenticated user
    #[arg(long)]
    as_user: Option<i64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Paginated, filtered listing
    List(ListArgs),
    /// One article by id
    Show { id: i64 },
    /// All known sources
    Sources,
    /// All known categories
    Categories,
}

#[derive(Debug, clap::Args)]
struct ListArgs {
    #[arg(long)]
    limit: Option<u32>,
    #[arg(long)]
    page: Option<u32>,
    /// Substring matched against title, description and content
    #[arg(long)]
    search: Option<String>,
    /// Publication day, YYYY-MM-DD
    #[arg(long)]
    date: Option<String>,
    /// Repeatable
    #[arg(long)]
    author: Vec<String>,
    /// Source slug or name fragment; repeatable
    #[arg(long)]
    source: Vec<String>,
    /// Category slug or name fragment; repeatable
    #[arg(long)]
    category: Vec<String>,
    #[arg(long)]
    sort_by: Option<String>,
    #[arg(long)]
    sort_order: Option<String>,
    /// Narrow by the current user's stored preferences
    #[arg(long)]
    use_preferences: bool,
    #[arg(long)]
    user_id: Option<i64>,
}

impl From<ListArgs> for ArticleParams {
    fn from(a: ListArgs) -> Self {
        ArticleParams {
            limit: a.limit,
            page: a.page,
            search: a.search,
            date: a.date,
            author: a.author,
            source: a.source,
            category: a.category,
            sort_by: a.sort_by,
            sort_order: a.sort_order,
            use_preferences: a.use_preferences,
            user_id: a.user_id,
        }
    }
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

    let caller = Caller {
        authenticated: args.as_user,
        user_id: None,
    };
    let out = match args.command {
        Command::List(list) => {
            let params = ArticleParams::from(list);
            serde_json::to_string_pretty(&articles::list_articles(&pool, caller, &params).await?)?
        }
        Command::Show { id } => serde_json::to_string_pretty(&articles::show_article(&pool, id).await?)?,
        Command::Sources => serde_json::to_string_pretty(&articles::list_sources(&pool).await?)?,
        Command::Categories => {
            serde_json::to_string_pretty(&articles::list_categories(&pool).await?)?
        }
    };
    println!("{out}");
    Ok(())
}
