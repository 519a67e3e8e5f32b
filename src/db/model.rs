//! Row and view models used by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::model::{Article, Category, Source};

/// Columns selected by every article read; pairs with [`ArticleRow`].
pub const ARTICLE_COLUMNS: &str = "a.id, a.title, a.description, a.content, a.url, a.image_url, \
     a.published_at, a.author, a.created_at, a.updated_at, \
     s.id AS source_id, s.name AS source_name, s.slug AS source_slug, \
     s.base_url AS source_base_url, s.api_key AS source_api_key, \
     c.id AS category_id, c.name AS category_name, c.slug AS category_slug";

pub const ARTICLE_FROM: &str = " FROM articles a \
     JOIN sources s ON s.id = a.source_id \
     LEFT JOIN categories c ON c.id = a.category_id";

/// Flat article row with its source and optional category joined in.
#[derive(Debug, Clone, FromRow)]
pub struct ArticleRow {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub source_id: i64,
    pub source_name: String,
    pub source_slug: String,
    pub source_base_url: Option<String>,
    pub source_api_key: Option<String>,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub category_slug: Option<String>,
}

impl From<ArticleRow> for Article {
    fn from(row: ArticleRow) -> Self {
        let category = match (row.category_id, row.category_name, row.category_slug) {
            (Some(id), Some(name), Some(slug)) => Some(Category { id, name, slug }),
            _ => None,
        };
        Article {
            id: row.id,
            title: row.title,
            description: row.description,
            content: row.content,
            url: row.url,
            image_url: row.image_url,
            published_at: row.published_at,
            author: row.author,
            source: Source {
                id: row.source_id,
                name: row.source_name,
                slug: row.source_slug,
                base_url: row.source_base_url,
                api_key: row.source_api_key,
            },
            category,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Outcome of a bulk save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub saved: usize,
    pub failed: usize,
}
