//! Composable article query and the three read-time stages that narrow it:
//! user preferences, ad-hoc filters and sort order.
//!
//! Stages only record [`Condition`]s on an [`ArticleQuery`]; the repository
//! turns the finished query into SQL. Conditions are always AND-ed together,
//! alternatives inside a single condition are OR-ed.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

use crate::error::{ApiError, ApiResult};
use crate::model::{fold_case, Preferences, SortDirection};

pub const DEFAULT_LIMIT: u32 = 10;

/// Request parameters accepted by the article listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleParams {
    pub limit: Option<u32>,
    pub page: Option<u32>,
    pub search: Option<String>,
    /// Calendar day, `YYYY-MM-DD`.
    pub date: Option<String>,
    #[serde(default)]
    pub author: Vec<String>,
    #[serde(default)]
    pub source: Vec<String>,
    #[serde(default)]
    pub category: Vec<String>,
    /// Presence alone decides whether `sort_order` is consulted.
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    #[serde(default)]
    pub use_preferences: bool,
    pub user_id: Option<i64>,
}

impl ArticleParams {
    pub fn per_page(&self) -> ApiResult<u32> {
        match self.limit {
            None => Ok(DEFAULT_LIMIT),
            Some(0) => Err(ApiError::validation("limit", "must be at least 1")),
            Some(n) => Ok(n),
        }
    }

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    SourceIdIn(Vec<i64>),
    CategoryIdIn(Vec<i64>),
    /// Author contains any of the needles.
    AuthorContainsAny(Vec<String>),
    /// Title, description or content contains the needle.
    TextContains(String),
    PublishedOn(NaiveDate),
    /// Source slug equals, or source name contains, any of the values.
    SourceMatchesAny(Vec<String>),
    /// Category slug equals, or category name contains, any of the values.
    CategoryMatchesAny(Vec<String>),
}

/// Query handle over articles joined with their source and category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleQuery {
    conditions: Vec<Condition>,
    direction: SortDirection,
}

impl ArticleQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, condition: Condition) -> &mut Self {
        self.conditions.push(condition);
        self
    }

    pub fn order_by_published(&mut self, direction: SortDirection) -> &mut Self {
        self.direction = direction;
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    /// Append ` WHERE ...` for every recorded condition.
    pub(crate) fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        if self.conditions.is_empty() {
            return;
        }
        qb.push(" WHERE ");
        for (i, condition) in self.conditions.iter().enumerate() {
            if i > 0 {
                qb.push(" AND ");
            }
            qb.push("(");
            push_condition(qb, condition);
            qb.push(")");
        }
    }

    pub(crate) fn push_order(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        let dir = self.direction.as_sql();
        qb.push(format!(
            " ORDER BY datetime(a.published_at) {dir}, a.id {dir}"
        ));
    }
}

fn push_condition(qb: &mut QueryBuilder<'_, Sqlite>, condition: &Condition) {
    match condition {
        Condition::SourceIdIn(ids) => push_id_in(qb, "a.source_id", ids),
        Condition::CategoryIdIn(ids) => push_id_in(qb, "a.category_id", ids),
        Condition::AuthorContainsAny(needles) => {
            push_any(qb, needles, |qb, needle| push_like(qb, "a.author_folded", needle))
        }
        Condition::TextContains(needle) => {
            push_like(qb, "a.title_folded", needle);
            qb.push(" OR ");
            push_like(qb, "a.description_folded", needle);
            qb.push(" OR ");
            push_like(qb, "a.content_folded", needle);
        }
        Condition::PublishedOn(day) => {
            qb.push("date(a.published_at) = ");
            qb.push_bind(day.format("%Y-%m-%d").to_string());
        }
        Condition::SourceMatchesAny(values) => push_any(qb, values, |qb, value| {
            qb.push("s.slug = ");
            qb.push_bind(value.to_string());
            qb.push(" OR ");
            push_like(qb, "s.name_folded", value);
        }),
        Condition::CategoryMatchesAny(values) => push_any(qb, values, |qb, value| {
            qb.push("c.slug = ");
            qb.push_bind(value.to_string());
            qb.push(" OR ");
            // Category names are stored lowercased.
            push_like(qb, "c.name", value);
        }),
    }
}

fn push_id_in(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, ids: &[i64]) {
    if ids.is_empty() {
        qb.push("1 = 0");
        return;
    }
    qb.push(column);
    qb.push(" IN (");
    let mut list = qb.separated(", ");
    for id in ids {
        list.push_bind(*id);
    }
    list.push_unseparated(")");
}

fn push_any<F>(qb: &mut QueryBuilder<'_, Sqlite>, values: &[String], mut each: F)
where
    F: FnMut(&mut QueryBuilder<'_, Sqlite>, &str),
{
    if values.is_empty() {
        qb.push("1 = 0");
        return;
    }
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        each(qb, value);
    }
}

/// Case-insensitive substring match against a case-folded `column`; `%` and
/// `_` in the needle are literal.
fn push_like(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, needle: &str) {
    qb.push(column);
    qb.push(" LIKE ");
    qb.push_bind(like_pattern(&fold_case(needle)));
    qb.push(" ESCAPE '\\'");
}

pub(crate) fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn non_blank(values: &[String]) -> Vec<String> {
    values
        .iter()
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .collect()
}

/// Restrict to the user's preferred sources, categories and authors.
///
/// Does nothing unless a user was resolved and the caller opted in. Each kind
/// of preference is skipped when the user has none of it.
pub fn apply_user_preferences(
    query: &mut ArticleQuery,
    preferences: Option<&Preferences>,
    enabled: bool,
) {
    let Some(prefs) = preferences else {
        return;
    };
    if !enabled {
        return;
    }
    if !prefs.sources.is_empty() {
        query.push(Condition::SourceIdIn(prefs.sources.clone()));
    }
    if !prefs.categories.is_empty() {
        query.push(Condition::CategoryIdIn(prefs.categories.clone()));
    }
    let authors = non_blank(&prefs.authors);
    if !authors.is_empty() {
        query.push(Condition::AuthorContainsAny(authors));
    }
}

/// Apply the optional ad-hoc filters carried by `params`.
pub fn apply_filters(query: &mut ArticleQuery, params: &ArticleParams) -> ApiResult<()> {
    if let Some(search) = params.search.as_deref().filter(|s| !s.trim().is_empty()) {
        query.push(Condition::TextContains(search.to_string()));
    }

    if let Some(date) = params.date.as_deref().filter(|s| !s.trim().is_empty()) {
        let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|_| ApiError::validation("date", format!("`{date}` is not a YYYY-MM-DD date")))?;
        query.push(Condition::PublishedOn(day));
    }

    let authors = non_blank(&params.author);
    if !authors.is_empty() {
        query.push(Condition::AuthorContainsAny(authors));
    }

    let sources = non_blank(&params.source);
    if !sources.is_empty() {
        query.push(Condition::SourceMatchesAny(sources));
    }

    let categories = non_blank(&params.category);
    if !categories.is_empty() {
        query.push(Condition::CategoryMatchesAny(categories));
    }

    Ok(())
}

/// Order by publication time. `sort_order` is only read when `sort_by` is
/// present; every other case sorts newest first.
pub fn apply_sorting(query: &mut ArticleQuery, params: &ArticleParams) -> ApiResult<()> {
    let direction = match (&params.sort_by, params.sort_order.as_deref()) {
        (Some(_), Some(order)) => SortDirection::parse(order).ok_or_else(|| {
            ApiError::validation("sort_order", format!("`{order}` is neither asc nor desc"))
        })?,
        _ => SortDirection::Desc,
    };
    query.order_by_published(direction);
    Ok(())
}
