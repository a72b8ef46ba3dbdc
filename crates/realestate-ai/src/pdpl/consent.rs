use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest consent decision; `timestamp` is epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub consent: bool,
    pub timestamp: i64,
}

pub trait ConsentRepository: Send + Sync {
    fn set(&self, user_id: &str, consent: bool, now: DateTime<Utc>) -> ConsentRecord;
    fn get(&self, user_id: &str) -> Option<ConsentRecord>;
    fn reset(&self);

    /// True only for an explicit, current opt-in.
    fn has_consented(&self, user_id: &str) -> bool {
        self.get(user_id).is_some_and(|record| record.consent)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryConsentLedger {
    records: Mutex<HashMap<String, ConsentRecord>>,
}

impl InMemoryConsentLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConsentRepository for InMemoryConsentLedger {
    fn set(&self, user_id: &str, consent: bool, now: DateTime<Utc>) -> ConsentRecord {
        let record = ConsentRecord {
            consent,
            timestamp: now.timestamp_millis(),
        };
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.to_string(), record);
        record
    }

    fn get(&self, user_id: &str) -> Option<ConsentRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .copied()
    }

    fn reset(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_decision_wins() {
        let ledger = InMemoryConsentLedger::new();
        let now = Utc::now();
        ledger.set("u-1", true, now);
        assert!(ledger.has_consented("u-1"));

        let revoked = ledger.set("u-1", false, now);
        assert_eq!(revoked.timestamp, now.timestamp_millis());
        assert!(!ledger.has_consented("u-1"));
        assert!(!ledger.has_consented("u-2"));

        ledger.reset();
        assert!(ledger.get("u-1").is_none());
    }
}
