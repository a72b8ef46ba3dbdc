use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use crate::cache::TtlCache;
use crate::config::SearchConfig;
use crate::pdpl::ConsentRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentLookup {
    Granted,
    Revoked,
    NotFound,
}

#[derive(Debug, thiserror::Error)]
pub enum ConsentError {
    #[error("Missing x-user-id header")]
    MissingUser,
    #[error("Consent not granted")]
    NotGranted,
    #[error("Consent record not found")]
    NotFound,
    #[error("Consent revoked")]
    Revoked,
    #[error("Consent lookup failed with status {0}")]
    Status(u16),
    #[error("Consent verification failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Consent service URL is invalid: {0}")]
    InvalidUrl(String),
}

/// Where the gate asks for a user's consent decision.
#[async_trait]
pub trait ConsentSource: Send + Sync {
    async fn lookup(&self, user_id: &str) -> Result<ConsentLookup, ConsentError>;
}

/// Reads the in-process PDPL ledger.
pub struct LedgerConsentSource {
    ledger: Arc<dyn ConsentRepository>,
}

impl LedgerConsentSource {
    pub fn new(ledger: Arc<dyn ConsentRepository>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl ConsentSource for LedgerConsentSource {
    async fn lookup(&self, user_id: &str) -> Result<ConsentLookup, ConsentError> {
        Ok(match self.ledger.get(user_id) {
            Some(record) if record.consent => ConsentLookup::Granted,
            Some(_) => ConsentLookup::Revoked,
            None => ConsentLookup::NotFound,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ConsentPayload {
    #[serde(default)]
    consent: bool,
}

/// Asks a remote consent endpoint at `GET {base}/{userId}`.
#[derive(Debug, Clone)]
pub struct HttpConsentSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpConsentSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn user_url(&self, user_id: &str) -> Result<Url, ConsentError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|err| ConsentError::InvalidUrl(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ConsentError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push(user_id);
        Ok(url)
    }
}

#[async_trait]
impl ConsentSource for HttpConsentSource {
    async fn lookup(&self, user_id: &str) -> Result<ConsentLookup, ConsentError> {
        let response = self
            .client
            .get(self.user_url(user_id)?)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(ConsentLookup::NotFound),
            status if !status.is_success() => Err(ConsentError::Status(status.as_u16())),
            _ => {
                let payload: ConsentPayload = response.json().await?;
                Ok(if payload.consent {
                    ConsentLookup::Granted
                } else {
                    ConsentLookup::Revoked
                })
            }
        }
    }
}

/// Enforces PDPL consent on search reads, caching each decision per user.
pub struct ConsentGate {
    enforce: bool,
    source: Arc<dyn ConsentSource>,
    cache: TtlCache<bool>,
    ttl: Duration,
}

impl ConsentGate {
    pub fn new(enforce: bool, source: Arc<dyn ConsentSource>, ttl: Duration) -> Self {
        Self {
            enforce,
            source,
            cache: TtlCache::new(),
            ttl,
        }
    }

    /// Remote source when `CONSENT_SERVICE_URL` is set, otherwise the ledger.
    pub fn from_config(config: &SearchConfig, ledger: Arc<dyn ConsentRepository>) -> Self {
        let source: Arc<dyn ConsentSource> = match &config.consent_service_url {
            Some(url) => Arc::new(HttpConsentSource::new(url.clone())),
            None => Arc::new(LedgerConsentSource::new(ledger)),
        };
        Self::new(config.enforce_consent, source, config.consent_cache_ttl)
    }

    pub fn enforced(&self) -> bool {
        self.enforce
    }

    pub fn reset(&self) {
        self.cache.flush(None);
    }

    pub async fn ensure(&self, user_id: Option<&str>) -> Result<(), ConsentError> {
        if !self.enforce {
            return Ok(());
        }
        let user_id = user_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ConsentError::MissingUser)?;

        if let Some(consent) = self.cache.get(user_id) {
            return if consent {
                Ok(())
            } else {
                Err(ConsentError::NotGranted)
            };
        }

        let lookup = self.source.lookup(user_id).await?;
        debug!(user_id, ?lookup, "search.consent lookup");
        match lookup {
            ConsentLookup::Granted => {
                self.cache.set(user_id, true, self.ttl);
                Ok(())
            }
            ConsentLookup::Revoked => {
                self.cache.set(user_id, false, self.ttl);
                Err(ConsentError::Revoked)
            }
            ConsentLookup::NotFound => {
                self.cache.set(user_id, false, self.ttl);
                Err(ConsentError::NotFound)
            }
        }
    }
}
