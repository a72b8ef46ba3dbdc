use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Initiated,
    Escrowed,
    Released,
    Refunded,
    Flagged,
}

impl PaymentStatus {
    pub fn label(self) -> &'static str {
        match self {
            PaymentStatus::Initiated => "initiated",
            PaymentStatus::Escrowed => "escrowed",
            PaymentStatus::Released => "released",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Flagged => "flagged",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmlReason {
    AmountOverLimit,
    OffshoreUser,
}

/// AML screening outcome stored alongside each payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmlResult {
    pub flag: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<AmlReason>,
}

impl AmlResult {
    pub fn clear() -> Self {
        Self {
            flag: false,
            reason: None,
        }
    }

    pub fn flagged(reason: AmlReason) -> Self {
        Self {
            flag: true,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: String,
    pub user_id: String,
    pub amount_aed: f64,
    pub status: PaymentStatus,
    pub stripe_payment_id: Option<String>,
    pub bank_escrow_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub aml: Option<AmlResult>,
}

impl PaymentRecord {
    /// A hold too long to represent never expires.
    pub fn release_available_at(&self, hold_days: i64) -> DateTime<Utc> {
        chrono::Duration::try_days(hold_days)
            .and_then(|hold| self.created_at.checked_add_signed(hold))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn view(&self) -> PaymentView {
        PaymentView {
            id: self.id.clone(),
            status: self.status,
            amount_aed: self.amount_aed,
            stripe_payment_id: self.stripe_payment_id.clone(),
            bank_escrow_ref: self.bank_escrow_ref.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            aml: self.aml,
        }
    }
}

/// Fields supplied when a payment is first persisted.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: String,
    pub amount_aed: f64,
    pub status: PaymentStatus,
    pub stripe_payment_id: Option<String>,
    pub bank_escrow_ref: Option<String>,
    pub aml: Option<AmlResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub id: String,
    pub status: PaymentStatus,
    #[serde(rename = "amount_aed")]
    pub amount_aed: f64,
    pub stripe_payment_id: Option<String>,
    pub bank_escrow_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub aml: Option<AmlResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    #[serde(default)]
    pub return_url: Option<String>,
    #[serde(default)]
    pub refresh_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub account_id: String,
    pub onboarding_link: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitiateRequest {
    pub amount_aed: f64,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateResponse {
    pub id: String,
    pub status: PaymentStatus,
    pub stripe_payment_id: String,
    pub client_secret: Option<String>,
    pub escrow_ref: String,
    pub aml: AmlResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleasedPayment {
    pub id: String,
    pub status: PaymentStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EscrowRelease {
    pub status: String,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReleaseOutcome {
    AlreadyReleased {
        released: EscrowRelease,
    },
    Released {
        released: EscrowRelease,
        payment: ReleasedPayment,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatusBucket {
    pub count: u64,
    pub total: f64,
}

impl StatusBucket {
    pub fn add(&mut self, amount: f64) {
        self.count += 1;
        self.total += amount;
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub summary: std::collections::BTreeMap<PaymentStatus, StatusBucket>,
    pub totals: StatusBucket,
    pub generated_at: DateTime<Utc>,
}
