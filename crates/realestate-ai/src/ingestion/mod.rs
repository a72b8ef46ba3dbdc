//! Partner feed ingestion: fetch JSON or XML, normalise records, verify
//! permits, upsert into the listing store, and invalidate the search cache.

pub mod feed;
pub mod normalizer;
pub mod pipeline;
pub mod schedule;
pub mod writer;

pub use feed::{fetch_feed, parse_feed, FeedFormat, FeedResult, RawItem};
pub use normalizer::normalise_listings;
pub use pipeline::{
    run_ingestion, CacheInvalidator, HttpCacheInvalidator, IngestionSummary, LocalCacheInvalidator,
    NoopInvalidator,
};
pub use schedule::{normalise_cron, parse_schedule, schedule_ingestion};
pub use writer::{
    HttpPermitVerifier, ListingWriter, PermitVerifier, ServicePermitVerifier, WriteResult,
};

use crate::search::SearchError;

#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("INGESTION_SOURCE_URL is not configured")]
    MissingSource,
    #[error("failed to fetch feed ({status})")]
    FeedStatus { status: u16 },
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("feed XML is malformed: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("permit verification failed with status {status}")]
    PermitCheck { status: u16 },
    #[error(transparent)]
    Store(#[from] SearchError),
    #[error("listing write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("cron expression is required to schedule ingestion")]
    MissingCron,
    #[error("invalid cron expression `{expression}`: {source}")]
    InvalidCron {
        expression: String,
        #[source]
        source: cron::error::Error,
    },
}
