//! Per-user preferred sources, categories and authors.
//!
//! Every `replace_*` call swaps the whole set inside one transaction.
use super::repo::Pool;
use crate::model::Preferences;
use anyhow::Result;
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::HashSet;
use tracing::instrument;

#[instrument(skip_all, fields(user_id = user_id))]
pub async fn load_preferences(pool: &Pool, user_id: i64) -> Result<Preferences> {
    let sources: Vec<i64> = sqlx::query_scalar(
        "SELECT source_id FROM user_preferred_sources WHERE user_id = ? ORDER BY source_id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    let categories: Vec<i64> = sqlx::query_scalar(
        "SELECT category_id FROM user_preferred_categories WHERE user_id = ? ORDER BY category_id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    let authors: Vec<String> = sqlx::query_scalar(
        "SELECT author_name FROM user_preferred_authors WHERE user_id = ? ORDER BY id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(Preferences {
        sources,
        categories,
        authors,
    })
}

/// Ids from `ids` that have no row in `table`. `table` is always a literal.
async fn missing_ids(pool: &Pool, table: &'static str, ids: &[i64]) -> Result<Vec<i64>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new(format!("SELECT id FROM {table} WHERE id IN ("));
    let mut list = qb.separated(", ");
    for id in ids {
        list.push_bind(*id);
    }
    list.push_unseparated(")");
    let found = qb
        .build()
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| row.try_get::<i64, _>(0))
        .collect::<Result<HashSet<i64>, _>>()?;
    let mut seen = HashSet::new();
    Ok(ids
        .iter()
        .copied()
        .filter(|id| !found.contains(id) && seen.insert(*id))
        .collect())
}

pub async fn missing_source_ids(pool: &Pool, ids: &[i64]) -> Result<Vec<i64>> {
    missing_ids(pool, "sources", ids).await
}

pub async fn missing_category_ids(pool: &Pool, ids: &[i64]) -> Result<Vec<i64>> {
    missing_ids(pool, "categories", ids).await
}

#[instrument(skip_all, fields(user_id = user_id, count = source_ids.len()))]
pub async fn replace_preferred_sources(pool: &Pool, user_id: i64, source_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM user_preferred_sources WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    for source_id in source_ids {
        sqlx::query(
            "INSERT INTO user_preferred_sources (user_id, source_id) VALUES (?, ?) \
             ON CONFLICT(user_id, source_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(*source_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

#[instrument(skip_all, fields(user_id = user_id, count = category_ids.len()))]
pub async fn replace_preferred_categories(
    pool: &Pool,
    user_id: i64,
    category_ids: &[i64],
) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM user_preferred_categories WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    for category_id in category_ids {
        sqlx::query(
            "INSERT INTO user_preferred_categories (user_id, category_id) VALUES (?, ?) \
             ON CONFLICT(user_id, category_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(*category_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

#[instrument(skip_all, fields(user_id = user_id, count = author_names.len()))]
pub async fn replace_preferred_authors(
    pool: &Pool,
    user_id: i64,
    author_names: &[String],
) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM user_preferred_authors WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    for name in author_names {
        sqlx::query(
            "INSERT INTO user_preferred_authors (user_id, author_name) VALUES (?, ?) \
             ON CONFLICT(user_id, author_name) DO NOTHING",
        )
        .bind(user_id)
        .bind(name)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

#[instrument(skip_all, fields(user_id = user_id))]
pub async fn clear_preferences(pool: &Pool, user_id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;
    for sql in [
        "DELETE FROM user_preferred_sources WHERE user_id = ?",
        "DELETE FROM user_preferred_categories WHERE user_id = ?",
        "DELETE FROM user_preferred_authors WHERE user_id = ?",
    ] {
        sqlx::query(sql).bind(user_id).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}
