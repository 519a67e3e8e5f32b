use super::model::{ArticleRow, SaveSummary, ARTICLE_COLUMNS, ARTICLE_FROM};
use crate::model::{fold_case, slugify, Article, ArticleRecord, Category, Page, Source, User};
use crate::query::ArticleQuery;
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, instrument, warn};

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized)
        .await
        .with_context(|| format!("failed to open database {normalized}"))?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// For a file-backed SQLite URL, expand a leading `~/`, make sure the parent
/// directory exists and ask SQLite to create the file. In-memory and
/// non-sqlite URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let path = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };
    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) if q.contains("mode=") => format!("sqlite://{path}?{q}"),
        Some(q) => format!("sqlite://{path}?{q}&mode=rwc"),
        None => format!("sqlite://{path}?mode=rwc"),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn source_from_row(row: &SqliteRow) -> Result<Source, sqlx::Error> {
    Ok(Source {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        base_url: row.try_get("base_url")?,
        api_key: row.try_get("api_key")?,
    })
}

fn category_from_row(row: &SqliteRow) -> Result<Category, sqlx::Error> {
    Ok(Category {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
    })
}

/// Look up the source named `name`, inserting it first if absent.
///
/// The insert is a no-op on conflict with the `(name, slug)` unique index, so
/// two writers racing on a new name end up reading the same row.
#[instrument(skip_all, fields(name = %name))]
pub async fn get_or_create_source(conn: &mut SqliteConnection, name: &str) -> Result<Source> {
    let slug = slugify(name);
    sqlx::query(
        "INSERT INTO sources (name, name_folded, slug) VALUES (?, ?, ?) \
         ON CONFLICT(name, slug) DO NOTHING",
    )
    .bind(name)
    .bind(fold_case(name))
    .bind(&slug)
    .execute(&mut *conn)
    .await?;
    let row = sqlx::query(
        "SELECT id, name, slug, base_url, api_key FROM sources WHERE name = ? AND slug = ?",
    )
    .bind(name)
    .bind(&slug)
    .fetch_one(&mut *conn)
    .await
    .context("source missing after insert")?;
    Ok(source_from_row(&row)?)
}

/// Category counterpart of [`get_or_create_source`]; the stored name is lowercased.
#[instrument(skip_all, fields(name = %name))]
pub async fn get_or_create_category(conn: &mut SqliteConnection, name: &str) -> Result<Category> {
    let lowered = name.to_lowercase();
    let slug = slugify(name);
    sqlx::query(
        "INSERT INTO categories (name, slug) VALUES (?, ?) ON CONFLICT(name, slug) DO NOTHING",
    )
    .bind(&lowered)
    .bind(&slug)
    .execute(&mut *conn)
    .await?;
    let row = sqlx::query("SELECT id, name, slug FROM categories WHERE name = ? AND slug = ?")
        .bind(&lowered)
        .bind(&slug)
        .fetch_one(&mut *conn)
        .await
        .context("category missing after insert")?;
    Ok(category_from_row(&row)?)
}

async fn article_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Article>> {
    let sql = format!("SELECT {ARTICLE_COLUMNS}{ARTICLE_FROM} WHERE a.id = ?");
    let row = sqlx::query_as::<_, ArticleRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(Article::from))
}

/// Store `record`, updating the existing article with the same URL if any.
///
/// Source and category resolution and the upsert commit together.
#[instrument(skip_all, fields(url = %record.url))]
pub async fn save_article(pool: &Pool, record: &ArticleRecord) -> Result<Article> {
    let mut tx = pool.begin().await?;

    let source = get_or_create_source(&mut tx, &record.source_name).await?;
    let category = match record
        .category_name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
    {
        Some(name) => Some(get_or_create_category(&mut tx, name).await?),
        None => None,
    };

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO articles \
            (title, description, content, url, image_url, published_at, author, \
             title_folded, description_folded, content_folded, author_folded, \
             source_id, category_id) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(url) DO UPDATE SET \
            title = excluded.title, \
            description = excluded.description, \
            content = excluded.content, \
            image_url = excluded.image_url, \
            published_at = excluded.published_at, \
            author = excluded.author, \
            title_folded = excluded.title_folded, \
            description_folded = excluded.description_folded, \
            content_folded = excluded.content_folded, \
            author_folded = excluded.author_folded, \
            source_id = excluded.source_id, \
            category_id = excluded.category_id, \
            updated_at = CURRENT_TIMESTAMP \
         RETURNING id",
    )
    .bind(&record.title)
    .bind(&record.description)
    .bind(&record.content)
    .bind(&record.url)
    .bind(&record.image_url)
    .bind(record.published_at)
    .bind(&record.author)
    .bind(fold_case(&record.title))
    .bind(record.description.as_deref().map(fold_case))
    .bind(record.content.as_deref().map(fold_case))
    .bind(record.author.as_deref().map(fold_case))
    .bind(source.id)
    .bind(category.as_ref().map(|c| c.id))
    .fetch_one(&mut *tx)
    .await
    .context("failed to upsert article")?;

    let article = article_by_id(&mut tx, id)
        .await?
        .context("article missing after upsert")?;
    tx.commit().await?;
    debug!(id, source = %source.name, "article saved");
    Ok(article)
}

/// Save every record in order. Each save commits on its own; a failing record
/// is logged and counted without undoing the ones before it.
#[instrument(skip_all, fields(count = records.len()))]
pub async fn save_many(pool: &Pool, records: &[ArticleRecord]) -> SaveSummary {
    let mut summary = SaveSummary::default();
    for record in records {
        match save_article(pool, record).await {
            Ok(_) => summary.saved += 1,
            Err(err) => {
                warn!(?err, url = %record.url, "failed to save article");
                summary.failed += 1;
            }
        }
    }
    summary
}

/// Fresh query over all articles, source and category joined.
pub fn article_query() -> ArticleQuery {
    ArticleQuery::new()
}

#[instrument(skip_all)]
pub async fn find_article(pool: &Pool, id: i64) -> Result<Option<Article>> {
    let mut conn = pool.acquire().await?;
    article_by_id(&mut conn, id).await
}

/// Run `query` and return page `page` (1-based) of `per_page` articles.
#[instrument(skip_all, fields(page = page, per_page = per_page))]
pub async fn paginate_articles(
    pool: &Pool,
    query: &ArticleQuery,
    page: u32,
    per_page: u32,
) -> Result<Page<Article>> {
    let page = page.max(1);
    let per_page = per_page.max(1);

    let mut count: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT COUNT(*)");
    count.push(ARTICLE_FROM);
    query.push_where(&mut count);
    let total: i64 = count
        .build()
        .fetch_one(pool)
        .await
        .context("failed to count articles")?
        .try_get(0)?;

    let Some(offset) = i64::from(page - 1).checked_mul(i64::from(per_page)) else {
        debug!(page, per_page, "page lies beyond any addressable offset");
        return Ok(Page::new(Vec::new(), page, per_page, total));
    };
    let mut select: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new(format!("SELECT {ARTICLE_COLUMNS}"));
    select.push(ARTICLE_FROM);
    query.push_where(&mut select);
    query.push_order(&mut select);
    select
        .push(" LIMIT ")
        .push_bind(i64::from(per_page))
        .push(" OFFSET ")
        .push_bind(offset);
    let rows: Vec<ArticleRow> = select
        .build_query_as()
        .fetch_all(pool)
        .await
        .context("failed to load articles")?;

    Ok(Page::new(
        rows.into_iter().map(Article::from).collect(),
        page,
        per_page,
        total,
    ))
}

pub async fn list_sources(pool: &Pool) -> Result<Vec<Source>> {
    let rows = sqlx::query("SELECT id, name, slug, base_url, api_key FROM sources ORDER BY name, id")
        .fetch_all(pool)
        .await?;
    rows.iter()
        .map(|row| source_from_row(row).map_err(Into::into))
        .collect()
}

pub async fn list_categories(pool: &Pool) -> Result<Vec<Category>> {
    let rows = sqlx::query("SELECT id, name, slug FROM categories ORDER BY name, id")
        .fetch_all(pool)
        .await?;
    rows.iter()
        .map(|row| category_from_row(row).map_err(Into::into))
        .collect()
}

#[instrument(skip_all)]
pub async fn get_or_create_user(pool: &Pool, email: &str, name: &str) -> Result<i64> {
    sqlx::query("INSERT INTO users (name, email) VALUES (?, ?) ON CONFLICT(email) DO NOTHING")
        .bind(name)
        .bind(email)
        .execute(pool)
        .await?;
    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await?;
    Ok(id)
}

pub async fn find_user(pool: &Pool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, name, email, created_at FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    Ok(Some(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        created_at: row.try_get("created_at")?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_pool() -> Pool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn record(url: &str, title: &str) -> ArticleRecord {
        ArticleRecord {
            title: title.into(),
            description: Some("desc".into()),
            content: Some("body".into()),
            url: url.into(),
            image_url: None,
            published_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            author: Some("John Doe".into()),
            source_name: "Test Source".into(),
            category_name: None,
        }
    }

    #[tokio::test]
    async fn save_creates_source_and_article() {
        let pool = setup_pool().await;
        let article = save_article(&pool, &record("https://example.com/a", "A"))
            .await
            .unwrap();
        assert_eq!(article.title, "A");
        assert_eq!(article.source.name, "Test Source");
        assert_eq!(article.source.slug, "test-source");
        assert!(article.category.is_none());
        assert_eq!(
            article.published_at,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn save_with_category_lowercases_name() {
        let pool = setup_pool().await;
        let mut rec = record("https://example.com/a", "A");
        rec.category_name = Some("Technology News".into());
        let article = save_article(&pool, &rec).await.unwrap();
        let category = article.category.unwrap();
        assert_eq!(category.name, "technology news");
        assert_eq!(category.slug, "technology-news");
    }

    #[tokio::test]
    async fn blank_category_is_left_unset() {
        let pool = setup_pool().await;
        let mut rec = record("https://example.com/a", "A");
        rec.category_name = Some("   ".into());
        let article = save_article(&pool, &rec).await.unwrap();
        assert!(article.category.is_none());
        assert!(list_categories(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn same_url_twice_updates_in_place() {
        let pool = setup_pool().await;
        let first = save_article(&pool, &record("https://example.com/a", "First"))
            .await
            .unwrap();
        let mut second = record("https://example.com/a", "Second");
        second.author = None;
        second.category_name = Some("World".into());
        let updated = save_article(&pool, &second).await.unwrap();

        assert_eq!(first.id, updated.id);
        assert_eq!(updated.title, "Second");
        assert_eq!(updated.author, None);
        assert_eq!(updated.category.unwrap().name, "world");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let pool = setup_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let a = get_or_create_source(&mut conn, "NewsCo").await.unwrap();
        let b = get_or_create_source(&mut conn, "NewsCo").await.unwrap();
        assert_eq!(a, b);

        let c = get_or_create_category(&mut conn, "Tech").await.unwrap();
        let d = get_or_create_category(&mut conn, "tech").await.unwrap();
        assert_eq!(c.id, d.id);
    }

    #[tokio::test]
    async fn colliding_slugs_stay_distinct() {
        let pool = setup_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let a = get_or_create_source(&mut conn, "News.Co").await.unwrap();
        let b = get_or_create_source(&mut conn, "News Co").await.unwrap();
        assert_eq!(a.slug, b.slug);
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn save_many_keeps_order_and_counts() {
        let pool = setup_pool().await;
        let records = vec![
            record("https://example.com/1", "One"),
            record("https://example.com/2", "Two"),
            record("https://example.com/1", "One again"),
        ];
        let summary = save_many(&pool, &records).await;
        assert_eq!(summary, SaveSummary { saved: 3, failed: 0 });

        let titles: Vec<String> = sqlx::query_scalar("SELECT title FROM articles ORDER BY id")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(titles, vec!["One again".to_string(), "Two".to_string()]);
    }

    #[tokio::test]
    async fn save_many_failure_keeps_earlier_saves() {
        let pool = setup_pool().await;
        sqlx::query(
            "CREATE TRIGGER reject_bad_url BEFORE INSERT ON articles \
             WHEN NEW.url = 'https://example.com/bad' \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let records = vec![
            record("https://example.com/1", "One"),
            record("https://example.com/bad", "Bad"),
            record("https://example.com/3", "Three"),
        ];
        let summary = save_many(&pool, &records).await;
        assert_eq!(summary, SaveSummary { saved: 2, failed: 1 });

        let urls: Vec<String> = sqlx::query_scalar("SELECT url FROM articles ORDER BY id")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(
            urls,
            vec![
                "https://example.com/1".to_string(),
                "https://example.com/3".to_string()
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_saves_share_source_and_category() {
        let td = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", td.path().join("race.db").display());
        let pool = init_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                let mut rec = record(&format!("https://example.com/race/{i}"), "Race");
                rec.source_name = "Racing Wire".into();
                rec.category_name = Some("Breaking".into());
                save_article(&pool, &rec).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let sources: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sources")
            .fetch_one(&pool)
            .await
            .unwrap();
        let categories: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
            .fetch_one(&pool)
            .await
            .unwrap();
        let articles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!((sources, categories, articles), (1, 1, 16));
    }

    #[tokio::test]
    async fn folded_columns_follow_upserts() {
        let pool = setup_pool().await;
        let mut rec = record("https://example.com/a", "ÜBER Alles");
        rec.author = Some("ÉMILE ZOLA".into());
        save_article(&pool, &rec).await.unwrap();
        rec.author = None;
        save_article(&pool, &rec).await.unwrap();

        let (title, author): (String, Option<String>) =
            sqlx::query_as("SELECT title_folded, author_folded FROM articles")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(title, "über alles");
        assert_eq!(author, None);
    }

    #[tokio::test]
    async fn paginate_far_past_the_end_is_empty() {
        let pool = setup_pool().await;
        save_article(&pool, &record("https://example.com/a", "A"))
            .await
            .unwrap();
        let page = paginate_articles(&pool, &article_query(), u32::MAX, u32::MAX)
            .await
            .unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.total, 1);
        assert_eq!(page.last_page, 1);
        assert_eq!(page.current_page, u32::MAX);
    }

    #[tokio::test]
    async fn find_article_by_id() {
        let pool = setup_pool().await;
        let saved = save_article(&pool, &record("https://example.com/a", "A"))
            .await
            .unwrap();
        assert_eq!(find_article(&pool, saved.id).await.unwrap(), Some(saved));
        assert_eq!(find_article(&pool, 999).await.unwrap(), None);
    }

    #[tokio::test]
    async fn paginate_reports_totals() {
        let pool = setup_pool().await;
        for i in 0..5 {
            let mut rec = record(&format!("https://example.com/{i}"), &format!("T{i}"));
            rec.published_at = Utc.with_ymd_and_hms(2025, 1, 1 + i, 0, 0, 0).unwrap();
            save_article(&pool, &rec).await.unwrap();
        }
        let page = paginate_articles(&pool, &article_query(), 2, 2).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.last_page, 3);
        assert_eq!(page.current_page, 2);
        let titles: Vec<&str> = page.data.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["T2", "T1"]);
    }

    #[tokio::test]
    async fn users_are_created_once() {
        let pool = setup_pool().await;
        let a = get_or_create_user(&pool, "jane@example.com", "Jane").await.unwrap();
        let b = get_or_create_user(&pool, "jane@example.com", "Jane D").await.unwrap();
        assert_eq!(a, b);
        let user = find_user(&pool, a).await.unwrap().unwrap();
        assert_eq!(user.name, "Jane");
        assert!(find_user(&pool, a + 1).await.unwrap().is_none());
    }

    #[test]
    fn sqlite_url_is_normalized() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(prepare_sqlite_url("postgres://x"), "postgres://x");
        let td = tempfile::tempdir().unwrap();
        let file = td.path().join("nested").join("news.db");
        let url = format!("sqlite://{}", file.display());
        assert_eq!(prepare_sqlite_url(&url), format!("{url}?mode=rwc"));
        assert!(file.parent().unwrap().exists());
    }
}
