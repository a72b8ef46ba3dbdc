use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::info;

use super::domain::PermitRecord;
use super::provider::PermitProvider;

/// Caches provider answers per Trakheesi number and ages them on read.
pub struct PermitService {
    provider: Arc<dyn PermitProvider>,
    cache: Mutex<HashMap<String, PermitRecord>>,
}

impl PermitService {
    pub fn new(provider: Arc<dyn PermitProvider>) -> Self {
        Self {
            provider,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Always asks the provider and replaces any cached answer.
    pub async fn check(&self, trakheesi: &str, now: DateTime<Utc>) -> PermitRecord {
        let record = self.provider.lookup(trakheesi, now).await;
        self.store(trakheesi, record);
        info!(
            provider = self.provider.name(),
            status = record.status.label(),
            "permits.check"
        );
        record
    }

    /// Cached answer when present, otherwise a fresh lookup; either way a
    /// valid record past its expiry is rewritten as expired.
    pub async fn status(&self, trakheesi: &str, now: DateTime<Utc>) -> PermitRecord {
        let record = match self.cached(trakheesi) {
            Some(record) => record,
            None => {
                let record = self.provider.lookup(trakheesi, now).await;
                self.store(trakheesi, record);
                record
            }
        };

        let aged = record.aged(now);
        if aged != record {
            self.store(trakheesi, aged);
        }
        aged
    }

    pub fn seed(&self, trakheesi: &str, record: PermitRecord) {
        self.store(trakheesi, record);
    }

    pub fn clear(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn cached(&self, trakheesi: &str) -> Option<PermitRecord> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(trakheesi)
            .copied()
    }

    fn store(&self, trakheesi: &str, record: PermitRecord) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(trakheesi.to_string(), record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permits::domain::PermitStatus;
    use crate::permits::provider::MockPermitProvider;
    use chrono::Duration;

    fn service() -> PermitService {
        PermitService::new(Arc::new(MockPermitProvider))
    }

    #[tokio::test]
    async fn status_expires_seeded_record_and_persists_it() {
        let service = service();
        let now = Utc::now();
        service.seed(
            "12345678",
            PermitRecord {
                status: PermitStatus::Valid,
                expires_at: (now - Duration::minutes(1)).timestamp_millis(),
            },
        );

        let first = service.status("12345678", now).await;
        assert_eq!(first.status, PermitStatus::Expired);
        assert_eq!(service.cached("12345678"), Some(first));
    }

    #[tokio::test]
    async fn check_overrides_expired_cache_entry() {
        let service = service();
        let now = Utc::now();
        service.seed(
            "12345678",
            PermitRecord {
                status: PermitStatus::Expired,
                expires_at: 1,
            },
        );
        let record = service.check("12345678", now).await;
        assert_eq!(record.status, PermitStatus::Valid);
        assert_eq!(service.status("12345678", now).await, record);
    }

    #[tokio::test]
    async fn status_computes_on_miss() {
        let service = service();
        let now = Utc::now();
        assert_eq!(
            service.status("11111110", now).await,
            PermitRecord::invalid()
        );
        service.clear();
        assert!(service.cached("11111110").is_none());
    }

    #[tokio::test]
    async fn cache_is_keyed_by_raw_value() {
        let service = service();
        let now = Utc::now();
        service.seed("12345678", PermitRecord::invalid());
        let padded = service.status(" 12345678 ", now).await;
        assert_eq!(padded.status, PermitStatus::Valid);
    }
}
