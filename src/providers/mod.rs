//! External news providers and the registry the fetcher iterates.
//!
//! Every client implements [`NewsProvider`]. Implementors only write
//! `try_fetch`; the provided `fetch_articles` turns any failure into a logged
//! empty batch so one provider's outage never aborts an ingestion run.
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::model::ArticleRecord;

pub mod guardian;
pub mod newsapi;
pub mod nytimes;

pub use guardian::GuardianClient;
pub use newsapi::NewsApiClient;
pub use nytimes::NyTimesClient;

const USER_AGENT: &str = concat!("news-aggregator/", env!("CARGO_PKG_VERSION"));
const MAX_LOGGED_BODY: usize = 512;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[async_trait]
pub trait NewsProvider: Send + Sync {
    /// Stable provider name used in logs and reports.
    fn name(&self) -> &'static str;

    /// One request to the provider, mapped into canonical records.
    async fn try_fetch(&self) -> Result<Vec<ArticleRecord>, ProviderError>;

    /// Total version of [`try_fetch`](Self::try_fetch): failures are logged
    /// and yield an empty batch.
    async fn fetch_articles(&self) -> Vec<ArticleRecord> {
        match self.try_fetch().await {
            Ok(records) => {
                info!(provider = self.name(), count = records.len(), "fetched articles");
                records
            }
            Err(err) => {
                error!(provider = self.name(), error = %err, "failed to fetch articles");
                Vec::new()
            }
        }
    }
}

pub fn build_http_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build HTTP client")
}

/// Parse `base` and make sure relative joins append to its path.
pub(crate) fn base_url(base: &str) -> Result<Url, ProviderError> {
    let with_slash = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    };
    Url::parse(&with_slash).map_err(|e| ProviderError::Endpoint(format!("{base}: {e}")))
}

pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url, ProviderError> {
    base.join(path)
        .map_err(|e| ProviderError::Endpoint(format!("{base}{path}: {e}")))
}

/// GET `url` with `query` and decode a JSON body. Non-2xx is an error.
pub(crate) async fn get_json<T: DeserializeOwned>(
    http: &Client,
    url: Url,
    query: &[(&str, &str)],
) -> Result<T, ProviderError> {
    // The query carries the API key; keep it out of error messages.
    let res = http
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(reqwest::Error::without_url)?;
    let status = res.status();
    if !status.is_success() {
        let mut body = res.text().await.unwrap_or_default();
        if body.len() > MAX_LOGGED_BODY {
            let cut = (0..=MAX_LOGGED_BODY)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            body.truncate(cut);
        }
        return Err(ProviderError::Status { status, body });
    }
    let body = res.text().await.map_err(reqwest::Error::without_url)?;
    Ok(serde_json::from_str(&body)?)
}

pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `Some` only for strings with visible content.
pub(crate) fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Collect normalized records, logging items that lack a title, url or date.
pub(crate) fn collect_records<R>(
    provider: &'static str,
    raw: Vec<R>,
    normalize: impl Fn(R) -> Option<ArticleRecord>,
) -> Vec<ArticleRecord> {
    let total = raw.len();
    let records: Vec<ArticleRecord> = raw.into_iter().filter_map(normalize).collect();
    if records.len() < total {
        warn!(
            provider,
            dropped = total - records.len(),
            "skipped items missing title, url or publication date"
        );
    }
    records
}

/// Build every enabled provider from configuration, in a fixed order.
pub fn registry(cfg: &Config, http: Client) -> Result<Vec<Box<dyn NewsProvider>>> {
    let mut providers: Vec<Box<dyn NewsProvider>> = Vec::new();

    let newsapi = &cfg.providers.newsapi;
    if newsapi.enabled {
        providers.push(Box::new(
            NewsApiClient::new(http.clone(), newsapi).context("newsapi provider")?,
        ));
    }
    let guardian = &cfg.providers.guardian;
    if guardian.enabled {
        providers.push(Box::new(
            GuardianClient::new(http.clone(), guardian).context("guardian provider")?,
        ));
    }
    let nytimes = &cfg.providers.nytimes;
    if nytimes.enabled {
        providers.push(Box::new(
            NyTimesClient::new(http, nytimes).context("nytimes provider")?,
        ));
    }

    Ok(providers)
}
