//! Per-user preference management.
//!
//! Every operation first resolves the current user from the [`Caller`]; when
//! nobody resolves the call fails with [`ApiError::Unauthorized`] before any
//! other store access. Updates validate their whole payload before the
//! replacing transaction runs.
use std::collections::BTreeSet;

use tracing::{info, instrument};

use crate::db::{self, Pool};
use crate::error::{ApiError, ApiResult};
use crate::model::{Preferences, User};

pub const MAX_AUTHOR_LEN: usize = 255;

/// Who is asking: an identity vouched for by the surrounding layer, and the
/// optional `user_id` request parameter used when that identity is absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Caller {
    pub authenticated: Option<i64>,
    pub user_id: Option<i64>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(id: i64) -> Self {
        Self {
            authenticated: Some(id),
            user_id: None,
        }
    }

    pub fn with_user_id(mut self, user_id: Option<i64>) -> Self {
        self.user_id = user_id;
        self
    }
}

/// Authenticated id first, then the `user_id` parameter. Ids without a
/// matching user are skipped.
pub async fn resolve_user(pool: &Pool, caller: Caller) -> ApiResult<Option<User>> {
    for id in [caller.authenticated, caller.user_id].into_iter().flatten() {
        if let Some(user) = db::find_user(pool, id).await? {
            return Ok(Some(user));
        }
    }
    Ok(None)
}

async fn require_user(pool: &Pool, caller: Caller) -> ApiResult<User> {
    resolve_user(pool, caller)
        .await?
        .ok_or(ApiError::Unauthorized)
}

#[instrument(skip_all)]
pub async fn show(pool: &Pool, caller: Caller) -> ApiResult<Preferences> {
    let user = require_user(pool, caller).await?;
    Ok(db::load_preferences(pool, user.id).await?)
}

#[instrument(skip_all)]
pub async fn update_sources(pool: &Pool, caller: Caller, source_ids: &[i64]) -> ApiResult<Preferences> {
    let user = require_user(pool, caller).await?;
    let ids = dedup_ids("source_ids", source_ids)?;
    let missing = db::missing_source_ids(pool, &ids).await?;
    if !missing.is_empty() {
        return Err(ApiError::validation(
            "source_ids",
            format!("unknown source ids: {}", join_ids(&missing)),
        ));
    }
    db::replace_preferred_sources(pool, user.id, &ids).await?;
    info!(user_id = user.id, count = ids.len(), "replaced preferred sources");
    Ok(db::load_preferences(pool, user.id).await?)
}

#[instrument(skip_all)]
pub async fn update_categories(
    pool: &Pool,
    caller: Caller,
    category_ids: &[i64],
) -> ApiResult<Preferences> {
    let user = require_user(pool, caller).await?;
    let ids = dedup_ids("category_ids", category_ids)?;
    let missing = db::missing_category_ids(pool, &ids).await?;
    if !missing.is_empty() {
        return Err(ApiError::validation(
            "category_ids",
            format!("unknown category ids: {}", join_ids(&missing)),
        ));
    }
    db::replace_preferred_categories(pool, user.id, &ids).await?;
    info!(user_id = user.id, count = ids.len(), "replaced preferred categories");
    Ok(db::load_preferences(pool, user.id).await?)
}

#[instrument(skip_all)]
pub async fn update_authors(
    pool: &Pool,
    caller: Caller,
    author_names: &[String],
) -> ApiResult<Preferences> {
    let user = require_user(pool, caller).await?;
    let names = validate_authors(author_names)?;
    db::replace_preferred_authors(pool, user.id, &names).await?;
    info!(user_id = user.id, count = names.len(), "replaced preferred authors");
    Ok(db::load_preferences(pool, user.id).await?)
}

/// Drop all three preference kinds for the current user.
#[instrument(skip_all)]
pub async fn clear(pool: &Pool, caller: Caller) -> ApiResult<()> {
    let user = require_user(pool, caller).await?;
    db::clear_preferences(pool, user.id).await?;
    info!(user_id = user.id, "cleared preferences");
    Ok(())
}

fn dedup_ids(field: &'static str, ids: &[i64]) -> ApiResult<Vec<i64>> {
    if ids.is_empty() {
        return Err(ApiError::validation(field, "must be a non-empty list"));
    }
    Ok(ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect())
}

/// Trimmed, deduplicated author names in first-seen order.
fn validate_authors(names: &[String]) -> ApiResult<Vec<String>> {
    if names.is_empty() {
        return Err(ApiError::validation("author_names", "must be a non-empty list"));
    }
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::validation("author_names", "names must not be blank"));
        }
        if name.chars().count() > MAX_AUTHOR_LEN {
            return Err(ApiError::validation(
                "author_names",
                format!("names may be at most {MAX_AUTHOR_LEN} characters"),
            ));
        }
        if seen.insert(name.to_string()) {
            out.push(name.to_string());
        }
    }
    Ok(out)
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
