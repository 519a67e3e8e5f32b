//! The Guardian content search (`GET {base}/search`).
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use super::{base_url, collect_records, endpoint, get_json, parse_timestamp, required};
use super::{NewsProvider, ProviderError};
use crate::config::Guardian;
use crate::model::ArticleRecord;

pub const NAME: &str = "guardian";
pub const SOURCE_NAME: &str = "The Guardian";
const SHOW_FIELDS: &str = "headline,body,thumbnail";

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    response: Option<SearchResponse>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RawContent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContent {
    pub web_title: Option<String>,
    pub web_url: Option<String>,
    pub web_publication_date: Option<String>,
    pub section_id: Option<String>,
    pub section_name: Option<String>,
    /// Requested `show-fields`; may be an object, an empty array, or absent.
    #[serde(default)]
    pub fields: Option<Value>,
}

impl RawContent {
    fn field(&self, key: &str) -> Option<String> {
        self.fields
            .as_ref()
            .and_then(|f| f.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Map one Guardian result. The Guardian exposes no byline in this feed.
pub fn normalize(raw: RawContent) -> Option<ArticleRecord> {
    let description = raw.field("headline");
    let content = raw.field("body");
    let image_url = raw.field("thumbnail");
    let title = required(raw.web_title)?;
    let url = required(raw.web_url)?;
    let published_at = parse_timestamp(raw.web_publication_date.as_deref()?)?;
    Some(ArticleRecord {
        title,
        description,
        content,
        url,
        image_url,
        published_at,
        author: None,
        source_name: SOURCE_NAME.to_string(),
        category_name: raw.section_name.or(raw.section_id),
    })
}

#[derive(Clone)]
pub struct GuardianClient {
    http: Client,
    base_url: Url,
    api_key: String,
    page_size: String,
}

impl fmt::Debug for GuardianClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardianClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GuardianClient {
    pub fn new(http: Client, cfg: &Guardian) -> Result<Self, ProviderError> {
        Ok(Self {
            http,
            base_url: base_url(&cfg.base_url)?,
            api_key: cfg.api_key.clone(),
            page_size: cfg.page_size.to_string(),
        })
    }
}

#[async_trait]
impl NewsProvider for GuardianClient {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn try_fetch(&self) -> Result<Vec<ArticleRecord>, ProviderError> {
        let url = endpoint(&self.base_url, "search")?;
        let body: SearchEnvelope = get_json(
            &self.http,
            url,
            &[
                ("api-key", self.api_key.as_str()),
                ("show-fields", SHOW_FIELDS),
                ("page-size", self.page_size.as_str()),
            ],
        )
        .await?;
        let results = body.response.map(|r| r.results).unwrap_or_default();
        Ok(collect_records(NAME, results, normalize))
    }
}
