//! Read side: paginated article listing, single lookup, and the source and
//! category catalogues.
use tracing::{debug, instrument};

use crate::db::{self, Pool};
use crate::error::{ApiError, ApiResult};
use crate::model::{Article, Category, Page, Source};
use crate::preferences::{resolve_user, Caller};
use crate::query::{apply_filters, apply_sorting, apply_user_preferences, ArticleParams};

/// List articles narrowed by the caller's preferences (when asked for), then
/// by the ad-hoc filters, then sorted and paginated.
///
/// The `user_id` parameter fills in for a caller that carries none; it only
/// matters when the authenticated identity is absent or unknown.
#[instrument(skip_all)]
pub async fn list_articles(
    pool: &Pool,
    caller: Caller,
    params: &ArticleParams,
) -> ApiResult<Page<Article>> {
    let per_page = params.per_page()?;
    let page = params.page();

    let prefs = if params.use_preferences {
        let caller = caller.with_user_id(caller.user_id.or(params.user_id));
        match resolve_user(pool, caller).await? {
            Some(user) => Some(db::load_preferences(pool, user.id).await?),
            None => None,
        }
    } else {
        None
    };

    let mut query = db::article_query();
    apply_user_preferences(&mut query, prefs.as_ref(), params.use_preferences);
    apply_filters(&mut query, params)?;
    apply_sorting(&mut query, params)?;
    debug!(conditions = query.conditions().len(), "article query built");

    Ok(db::paginate_articles(pool, &query, page, per_page).await?)
}

#[instrument(skip_all, fields(article_id = id))]
pub async fn show_article(pool: &Pool, id: i64) -> ApiResult<Article> {
    db::find_article(pool, id)
        .await?
        .ok_or(ApiError::NotFound {
            resource: "article",
            id,
        })
}

pub async fn list_sources(pool: &Pool) -> ApiResult<Vec<Source>> {
    Ok(db::list_sources(pool).await?)
}

pub async fn list_categories(pool: &Pool) -> ApiResult<Vec<Category>> {
    Ok(db::list_categories(pool).await?)
}
