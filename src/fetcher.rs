use futures::future::join_all;
use tracing::{info, instrument};

use crate::db::{self, Pool};
use crate::providers::NewsProvider;

/// Per-provider outcome of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReport {
    pub provider: &'static str,
    pub fetched: usize,
    pub saved: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub providers: Vec<ProviderReport>,
}

impl FetchReport {
    pub fn fetched(&self) -> usize {
        self.providers.iter().map(|p| p.fetched).sum()
    }

    pub fn saved(&self) -> usize {
        self.providers.iter().map(|p| p.saved).sum()
    }

    pub fn failed(&self) -> usize {
        self.providers.iter().map(|p| p.failed).sum()
    }
}

/// Pulls every registered provider and hands the batches to the store.
pub struct Fetcher {
    pool: Pool,
    providers: Vec<Box<dyn NewsProvider>>,
}

impl Fetcher {
    pub fn new(pool: Pool, providers: Vec<Box<dyn NewsProvider>>) -> Self {
        Self { pool, providers }
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Fetch from all providers concurrently, then store the batches one
    /// after another in registry order. Never fails: provider errors are
    /// already empty batches and store errors are counted per record.
    #[instrument(skip_all, fields(providers = self.providers.len()))]
    pub async fn fetch_and_store(&self) -> FetchReport {
        let batches = join_all(
            self.providers
                .iter()
                .map(|provider| async move { (provider.name(), provider.fetch_articles().await) }),
        )
        .await;

        let mut report = FetchReport::default();
        for (provider, records) in batches {
            let summary = db::save_many(&self.pool, &records).await;
            info!(
                provider,
                fetched = records.len(),
                saved = summary.saved,
                failed = summary.failed,
                "stored provider batch"
            );
            report.providers.push(ProviderReport {
                provider,
                fetched: records.len(),
                saved: summary.saved,
                failed: summary.failed,
            });
        }
        report
    }
}
