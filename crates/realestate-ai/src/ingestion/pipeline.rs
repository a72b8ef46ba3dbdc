use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::feed::fetch_feed;
use super::normalizer::normalise_listings;
use super::writer::{ListingWriter, WriteResult};
use super::IngestionError;
use crate::search::{SearchCache, ADMIN_KEY_HEADER};

const RUNS_TOTAL: &str = "ingestion_runs_total";
const ROWS_WRITTEN_TOTAL: &str = "ingestion_rows_written_total";
const LAST_RUN_TIMESTAMP: &str = "ingestion_last_run_timestamp";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestionSummary {
    pub total: usize,
    pub normalised: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Tells search that listings changed after a write.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, result: &WriteResult);
}

fn has_changes(result: &WriteResult) -> bool {
    result.inserted + result.updated > 0
}

/// Flushes the in-process search cache.
pub struct LocalCacheInvalidator {
    cache: Arc<SearchCache>,
}

impl LocalCacheInvalidator {
    pub fn new(cache: Arc<SearchCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl CacheInvalidator for LocalCacheInvalidator {
    async fn invalidate(&self, result: &WriteResult) {
        if !has_changes(result) {
            return;
        }
        let cleared = self.cache.flush(None);
        info!(status = "cleared", cleared, "ingestion.reindex");
    }
}

/// Calls a remote search service's `POST /admin/reindex`. Failures are
/// logged and never fail the run.
pub struct HttpCacheInvalidator {
    client: reqwest::Client,
    endpoint: String,
    admin_key: Option<String>,
}

impl HttpCacheInvalidator {
    pub fn new(base_url: &str, admin_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/admin/reindex", base_url.trim_end_matches('/')),
            admin_key,
        }
    }
}

#[async_trait]
impl CacheInvalidator for HttpCacheInvalidator {
    async fn invalidate(&self, result: &WriteResult) {
        if !has_changes(result) {
            return;
        }
        let Some(admin_key) = self.admin_key.as_deref().filter(|key| !key.is_empty()) else {
            warn!("ingestion.reindex SEARCH_ADMIN_KEY not set, skipping cache invalidation");
            return;
        };

        match self
            .client
            .post(&self.endpoint)
            .header(ADMIN_KEY_HEADER, admin_key)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!(status = "cleared", endpoint = %self.endpoint, "ingestion.reindex");
            }
            Ok(response) => {
                error!(status = response.status().as_u16(), "ingestion.reindex");
            }
            Err(err) => {
                error!(error = %err, "ingestion.reindex");
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInvalidator;

#[async_trait]
impl CacheInvalidator for NoopInvalidator {
    async fn invalidate(&self, _result: &WriteResult) {}
}

fn record_run(result: &'static str, rows_written: usize, now: DateTime<Utc>) {
    metrics::counter!(RUNS_TOTAL, "result" => result).increment(1);
    if rows_written > 0 {
        metrics::counter!(ROWS_WRITTEN_TOTAL).increment(rows_written as u64);
    }
    if result != "error" {
        metrics::gauge!(LAST_RUN_TIMESTAMP).set(now.timestamp() as f64);
    }
}

/// One full pass: fetch, normalise, verify and write, then invalidate search.
pub async fn run_ingestion(
    client: &reqwest::Client,
    source_url: Option<&str>,
    writer: &ListingWriter,
    invalidator: &dyn CacheInvalidator,
    now: DateTime<Utc>,
) -> Result<IngestionSummary, IngestionError> {
    let source_url = source_url
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or(IngestionError::MissingSource)?;

    match ingest(client, source_url, writer, invalidator, now).await {
        Ok((summary, label)) => {
            record_run(label, summary.inserted + summary.updated, now);
            Ok(summary)
        }
        Err(err) => {
            record_run("error", 0, now);
            Err(err)
        }
    }
}

async fn ingest(
    client: &reqwest::Client,
    source_url: &str,
    writer: &ListingWriter,
    invalidator: &dyn CacheInvalidator,
    now: DateTime<Utc>,
) -> Result<(IngestionSummary, &'static str), IngestionError> {
    let feed = fetch_feed(client, source_url).await?;
    let format = feed.format.label();
    let total = feed.items.len();
    if total == 0 {
        info!(
            total = 0,
            normalised = 0,
            format,
            "ingestion.run no listings returned from source feed"
        );
        return Ok((IngestionSummary::default(), "empty"));
    }

    let normalised = normalise_listings(&feed.items);
    if normalised.is_empty() {
        warn!(
            total,
            normalised = 0,
            format,
            "ingestion.run no listings satisfied normalisation rules"
        );
        return Ok((
            IngestionSummary {
                total,
                skipped: total,
                ..IngestionSummary::default()
            },
            "skipped",
        ));
    }

    let normalised_count = normalised.len();
    let written = writer.write(normalised, now).await?;
    invalidator.invalidate(&written).await;

    let summary = IngestionSummary {
        total,
        normalised: normalised_count,
        inserted: written.inserted,
        updated: written.updated,
        skipped: written.skipped,
    };
    info!(
        total = summary.total,
        normalised = summary.normalised,
        inserted = summary.inserted,
        updated = summary.updated,
        skipped = summary.skipped,
        format,
        "ingestion.run"
    );
    Ok((summary, "success"))
}
