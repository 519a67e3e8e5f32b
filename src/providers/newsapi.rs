//! NewsAPI top headlines (`GET {base}/top-headlines`).
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt;

use super::{base_url, collect_records, endpoint, get_json, parse_timestamp, required};
use super::{NewsProvider, ProviderError};
use crate::config::NewsApi;
use crate::model::ArticleRecord;

pub const NAME: &str = "newsapi";
/// Used when an item carries no source name of its own.
pub const DEFAULT_SOURCE: &str = "NewsAPI";

#[derive(Debug, Deserialize)]
struct TopHeadlines {
    #[serde(default)]
    articles: Vec<RawArticle>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawArticle {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    pub url_to_image: Option<String>,
    pub published_at: Option<String>,
    pub author: Option<String>,
    pub source: Option<RawSource>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSource {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// Map one NewsAPI item; `None` when title, url or publication date is unusable.
pub fn normalize(raw: RawArticle) -> Option<ArticleRecord> {
    let title = required(raw.title)?;
    let url = required(raw.url)?;
    let published_at = parse_timestamp(raw.published_at.as_deref()?)?;
    Some(ArticleRecord {
        title,
        description: raw.description,
        content: raw.content,
        url,
        image_url: raw.url_to_image,
        published_at,
        author: raw.author,
        source_name: raw
            .source
            .and_then(|s| s.name)
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        category_name: raw.category,
    })
}

#[derive(Clone)]
pub struct NewsApiClient {
    http: Client,
    base_url: Url,
    api_key: String,
    language: String,
    page_size: String,
}

impl fmt::Debug for NewsApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewsApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl NewsApiClient {
    pub fn new(http: Client, cfg: &NewsApi) -> Result<Self, ProviderError> {
        Ok(Self {
            http,
            base_url: base_url(&cfg.base_url)?,
            api_key: cfg.api_key.clone(),
            language: cfg.language.clone(),
            page_size: cfg.page_size.to_string(),
        })
    }
}

#[async_trait]
impl NewsProvider for NewsApiClient {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn try_fetch(&self) -> Result<Vec<ArticleRecord>, ProviderError> {
        let url = endpoint(&self.base_url, "top-headlines")?;
        let body: TopHeadlines = get_json(
            &self.http,
            url,
            &[
                ("language", self.language.as_str()),
                ("pageSize", self.page_size.as_str()),
                ("apiKey", self.api_key.as_str()),
            ],
        )
        .await?;
        Ok(collect_records(NAME, body.articles, normalize))
    }
}
