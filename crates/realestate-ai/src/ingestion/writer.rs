use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::IngestionError;
use crate::permits::PermitService;
use crate::search::{upsert_listing, ListingStore, NewListing, UpsertOutcome};

const VALID_STATUS: &str = "valid";

/// Resolves a Trakheesi number to its registry status label.
#[async_trait]
pub trait PermitVerifier: Send + Sync {
    async fn verify(&self, permit: &str) -> Result<String, IngestionError>;
}

/// Verifies against the in-process permit service.
pub struct ServicePermitVerifier {
    service: Arc<PermitService>,
}

impl ServicePermitVerifier {
    pub fn new(service: Arc<PermitService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl PermitVerifier for ServicePermitVerifier {
    async fn verify(&self, permit: &str) -> Result<String, IngestionError> {
        let record = self.service.check(permit, Utc::now()).await;
        Ok(record.status.label().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct PermitCheckPayload {
    #[serde(default)]
    status: String,
}

/// Verifies through a remote `POST /permits/check`.
#[derive(Debug, Clone)]
pub struct HttpPermitVerifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPermitVerifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl PermitVerifier for HttpPermitVerifier {
    async fn verify(&self, permit: &str) -> Result<String, IngestionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&json!({ "trakheesi_number": permit }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IngestionError::PermitCheck {
                status: status.as_u16(),
            });
        }
        let payload: PermitCheckPayload = response.json().await?;
        Ok(payload.status)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteResult {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Writes permit-approved listings into the store in a single transaction.
pub struct ListingWriter {
    store: Arc<ListingStore>,
    verifier: Arc<dyn PermitVerifier>,
    memo: Mutex<HashMap<String, bool>>,
}

impl ListingWriter {
    pub fn new(store: Arc<ListingStore>, verifier: Arc<dyn PermitVerifier>) -> Self {
        Self {
            store,
            verifier,
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn reset_memo(&self) {
        self.memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn remembered(&self, permit: &str) -> Option<bool> {
        self.memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(permit)
            .copied()
    }

    /// Returns why a permit is rejected, or `None` when it may be written.
    /// Verified outcomes are memoised for the writer's lifetime; transport
    /// failures are not.
    async fn rejection(&self, permit: &str) -> Option<String> {
        let permit = permit.trim();
        if permit.is_empty() {
            return Some("Missing permit number".to_string());
        }
        match self.remembered(permit) {
            Some(true) => return None,
            Some(false) => return Some(format!("Permit {permit} not approved")),
            None => {}
        }

        match self.verifier.verify(permit).await {
            Ok(status) => {
                info!(permit, status = %status, "ingestion.permit");
                let approved = status == VALID_STATUS;
                self.memo
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(permit.to_string(), approved);
                if approved {
                    None
                } else {
                    let status = if status.is_empty() { "unknown" } else { &status };
                    Some(format!("Permit {permit} is not valid (status: {status})"))
                }
            }
            Err(err) => Some(err.to_string()),
        }
    }

    pub async fn write(
        &self,
        listings: Vec<NewListing>,
        now: DateTime<Utc>,
    ) -> Result<WriteResult, IngestionError> {
        let mut result = WriteResult::default();
        if listings.is_empty() {
            return Ok(result);
        }

        let mut approved = Vec::with_capacity(listings.len());
        for listing in listings {
            match self.rejection(&listing.permit).await {
                None => approved.push(listing),
                Some(reason) => {
                    result.skipped += 1;
                    warn!(permit = %listing.permit, reason = %reason, "ingestion.permit.invalid");
                }
            }
        }

        let store = Arc::clone(&self.store);
        let outcomes = tokio::task::spawn_blocking(move || {
            store.transaction(|tx| {
                approved
                    .iter()
                    .map(|listing| upsert_listing(tx, listing, now))
                    .collect::<Result<Vec<_>, _>>()
            })
        })
        .await??;

        for outcome in outcomes {
            match outcome {
                UpsertOutcome::Inserted => result.inserted += 1,
                UpsertOutcome::Updated => result.updated += 1,
                UpsertOutcome::Unchanged => result.skipped += 1,
            }
        }
        info!(
            inserted = result.inserted,
            updated = result.updated,
            skipped = result.skipped,
            "ingestion.writer"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingVerifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PermitVerifier for CountingVerifier {
        async fn verify(&self, permit: &str) -> Result<String, IngestionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(if permit.starts_with("OK") {
                "valid".to_string()
            } else {
                "expired".to_string()
            })
        }
    }

    fn listing(permit: &str, price: f64) -> NewListing {
        NewListing {
            permit: permit.to_string(),
            title: format!("Listing {permit}"),
            description: None,
            price_aed: price,
            bedrooms: 2,
            bathrooms: 2,
            sqft: 1100.0,
            community: "Dubai Hills".to_string(),
            lat: 25.11,
            lon: 55.25,
        }
    }

    #[tokio::test]
    async fn writes_approved_listings_and_memoises_verdicts() {
        let store = Arc::new(ListingStore::open_in_memory().expect("store"));
        let verifier = Arc::new(CountingVerifier {
            calls: AtomicUsize::new(0),
        });
        let writer = ListingWriter::new(store.clone(), verifier.clone());
        let now = Utc::now();

        let first = writer
            .write(
                vec![listing("OK-1", 1.0), listing("BAD-1", 2.0), listing(" ", 3.0)],
                now,
            )
            .await
            .expect("written");
        assert_eq!(
            first,
            WriteResult {
                inserted: 1,
                updated: 0,
                skipped: 2
            }
        );

        let second = writer
            .write(vec![listing("OK-1", 5.0), listing("BAD-1", 2.0)], now)
            .await
            .expect("written");
        assert_eq!(second.updated, 1);
        assert_eq!(second.skipped, 1);
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 2);
        let stored = store.find_by_permit("OK-1").expect("query").expect("row");
        assert_eq!(stored.listing.price_aed, 5.0);

        writer.reset_memo();
        writer
            .write(vec![listing("OK-1", 5.0)], now)
            .await
            .expect("written");
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn http_verifier_posts_trakheesi_number() {
        let server = MockServer::start_async().await;
        let check = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/permits/check")
                    .json_body(serde_json::json!({ "trakheesi_number": "12345678" }));
                then.status(200)
                    .json_body(serde_json::json!({ "status": "valid", "expiresAt": 1 }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/permits/check")
                    .json_body(serde_json::json!({ "trakheesi_number": "99999999" }));
                then.status(503);
            })
            .await;

        let verifier = HttpPermitVerifier::new(server.url("/permits/check"));
        assert_eq!(verifier.verify("12345678").await.expect("status"), "valid");
        check.assert_async().await;

        let err = verifier.verify("99999999").await.expect_err("unavailable");
        assert!(matches!(err, IngestionError::PermitCheck { status: 503 }));
    }

    #[tokio::test]
    async fn service_verifier_uses_permit_rules() {
        let service = Arc::new(PermitService::new(Arc::new(
            crate::permits::MockPermitProvider,
        )));
        let verifier = ServicePermitVerifier::new(service);
        assert_eq!(verifier.verify("12345678").await.expect("status"), "valid");
        assert_eq!(verifier.verify("12345670").await.expect("status"), "invalid");
    }
}
