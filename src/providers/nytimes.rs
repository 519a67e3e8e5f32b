//! New York Times top stories (`GET {base}/{section}.json`).
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt;

use super::{base_url, collect_records, endpoint, get_json, parse_timestamp, required};
use super::{NewsProvider, ProviderError};
use crate::config::NyTimes;
use crate::model::ArticleRecord;

pub const NAME: &str = "nytimes";
pub const SOURCE_NAME: &str = "New York Times";

#[derive(Debug, Deserialize)]
struct TopStories {
    #[serde(default)]
    results: Vec<RawStory>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStory {
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub summary: Option<String>,
    pub url: Option<String>,
    pub published_date: Option<String>,
    pub byline: Option<String>,
    pub section: Option<String>,
    #[serde(default)]
    pub multimedia: Option<Vec<RawMedia>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMedia {
    pub url: Option<String>,
}

/// Map one top story. The abstract doubles as description and content.
pub fn normalize(raw: RawStory) -> Option<ArticleRecord> {
    let title = required(raw.title)?;
    let url = required(raw.url)?;
    let published_at = parse_timestamp(raw.published_date.as_deref()?)?;
    let image_url = raw
        .multimedia
        .and_then(|media| media.into_iter().next())
        .and_then(|first| first.url);
    Some(ArticleRecord {
        title,
        description: raw.summary.clone(),
        content: raw.summary,
        url,
        image_url,
        published_at,
        author: raw.byline,
        source_name: SOURCE_NAME.to_string(),
        category_name: raw.section,
    })
}

#[derive(Clone)]
pub struct NyTimesClient {
    http: Client,
    base_url: Url,
    api_key: String,
    section: String,
}

impl fmt::Debug for NyTimesClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NyTimesClient")
            .field("base_url", &self.base_url)
            .field("section", &self.section)
            .finish_non_exhaustive()
    }
}

impl NyTimesClient {
    pub fn new(http: Client, cfg: &NyTimes) -> Result<Self, ProviderError> {
        Ok(Self {
            http,
            base_url: base_url(&cfg.base_url)?,
            api_key: cfg.api_key.clone(),
            section: cfg.section.trim().to_string(),
        })
    }
}

#[async_trait]
impl NewsProvider for NyTimesClient {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn try_fetch(&self) -> Result<Vec<ArticleRecord>, ProviderError> {
        let url = endpoint(&self.base_url, &format!("{}.json", self.section))?;
        let body: TopStories =
            get_json(&self.http, url, &[("api-key", self.api_key.as_str())]).await?;
        Ok(collect_records(NAME, body.results, normalize))
    }
}
