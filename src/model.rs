use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static NON_ALNUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("valid slug pattern"));

/// Lowercase `name` and collapse every run of non-alphanumeric characters
/// into a single dash, trimming dashes at both ends.
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    NON_ALNUM
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Unicode lowercase form stored next to searchable text and applied to
/// every substring needle.
pub fn fold_case(value: &str) -> String {
    value.to_lowercase()
}

/// Canonical record every provider maps its raw items into before storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub author: Option<String>,
    pub source_name: String,
    pub category_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub base_url: Option<String>,
    /// Provider credential; never leaves the process.
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

/// Stored article with its source and category resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub author: Option<String>,
    pub source: Source,
    pub category: Option<Category>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// A user's stored likes, as ids for sources/categories and free text for authors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub sources: Vec<i64>,
    pub categories: Vec<i64>,
    pub authors: Vec<String>,
}

impl Preferences {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.categories.is_empty() && self.authors.is_empty()
    }
}

/// One page of results plus the totals needed to navigate the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub current_page: u32,
    pub per_page: u32,
    pub total: i64,
    pub last_page: u32,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, current_page: u32, per_page: u32, total: i64) -> Self {
        let per_page = per_page.max(1);
        let pages = (total.max(0) as u64).div_ceil(per_page as u64);
        Self {
            data,
            current_page,
            per_page,
            total,
            last_page: pages.max(1) as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}
