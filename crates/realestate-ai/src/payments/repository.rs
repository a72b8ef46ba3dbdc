use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::domain::{NewPayment, PaymentRecord, PaymentStatus};

/// Storage abstraction so the payment service can be exercised in isolation.
pub trait PaymentRepository: Send + Sync {
    fn create(&self, payment: NewPayment, now: DateTime<Utc>) -> PaymentRecord;
    fn update_status(
        &self,
        id: &str,
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Option<PaymentRecord>;
    fn get(&self, id: &str) -> Option<PaymentRecord>;
    /// Newest first.
    fn list_for_user(&self, user_id: &str) -> Vec<PaymentRecord>;
    fn list_all(&self) -> Vec<PaymentRecord>;
    fn reset(&self);
}

#[derive(Debug, Default)]
pub struct InMemoryPaymentRepository {
    payments: Mutex<HashMap<String, PaymentRecord>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully formed record, replacing any with the same id.
    pub fn insert(&self, record: PaymentRecord) {
        self.payments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id.clone(), record);
    }
}

impl PaymentRepository for InMemoryPaymentRepository {
    fn create(&self, payment: NewPayment, now: DateTime<Utc>) -> PaymentRecord {
        let record = PaymentRecord {
            id: Uuid::new_v4().to_string(),
            user_id: payment.user_id,
            amount_aed: payment.amount_aed,
            status: payment.status,
            stripe_payment_id: payment.stripe_payment_id,
            bank_escrow_ref: payment.bank_escrow_ref,
            created_at: now,
            updated_at: now,
            aml: payment.aml,
        };
        self.insert(record.clone());
        record
    }

    fn update_status(
        &self,
        id: &str,
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Option<PaymentRecord> {
        let mut payments = self.payments.lock().unwrap_or_else(PoisonError::into_inner);
        let record = payments.get_mut(id)?;
        record.status = status;
        record.updated_at = now;
        Some(record.clone())
    }

    fn get(&self, id: &str) -> Option<PaymentRecord> {
        self.payments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn list_for_user(&self, user_id: &str) -> Vec<PaymentRecord> {
        let payments = self.payments.lock().unwrap_or_else(PoisonError::into_inner);
        let mut owned: Vec<PaymentRecord> = payments
            .values()
            .filter(|payment| payment.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned
    }

    fn list_all(&self) -> Vec<PaymentRecord> {
        self.payments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn reset(&self) {
        self.payments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
