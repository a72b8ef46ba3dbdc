use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use crate::audit::AuditLogger;
use crate::auth::{Claims, InMemoryUserRepository, Role, UserRecord, UserRepository};
use crate::config::PaymentConfig;
use crate::payments::domain::EscrowRelease;
use crate::payments::gateway::{AccountLink, PaymentIntent, StripeAccount};
use crate::payments::{
    EscrowGateway, EscrowHold, GatewayError, InMemoryPaymentRepository, PaymentDeps,
    PaymentService, StripeGateway,
};
use crate::pdpl::{ConsentRepository, InMemoryConsentLedger};

pub(super) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

#[derive(Default)]
pub(super) struct FakeStripe {
    pub(super) fail: bool,
    pub(super) links: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl StripeGateway for FakeStripe {
    async fn create_account(&self, _email: &str) -> Result<StripeAccount, GatewayError> {
        if self.fail {
            return Err(GatewayError::Status {
                status: 500,
                body: "stripe down".to_string(),
            });
        }
        Ok(StripeAccount {
            id: "acct_1".to_string(),
        })
    }

    async fn create_account_link(
        &self,
        account_id: &str,
        return_url: &str,
        refresh_url: &str,
    ) -> Result<AccountLink, GatewayError> {
        self.links.lock().expect("links mutex").push((
            account_id.to_string(),
            return_url.to_string(),
            refresh_url.to_string(),
        ));
        Ok(AccountLink {
            url: "https://connect.stripe.test/onboard".to_string(),
            expires_at: 1_900_000_000,
        })
    }

    async fn create_payment_intent(
        &self,
        _amount_aed: f64,
        _currency: &str,
    ) -> Result<PaymentIntent, GatewayError> {
        if self.fail {
            return Err(GatewayError::Status {
                status: 500,
                body: "stripe down".to_string(),
            });
        }
        Ok(PaymentIntent {
            id: "pi_1".to_string(),
            client_secret: Some("cs_1".to_string()),
        })
    }
}

#[derive(Default)]
pub(super) struct FakeEscrow {
    pub(super) released: Mutex<Vec<String>>,
}

#[async_trait]
impl EscrowGateway for FakeEscrow {
    async fn hold(&self, _amount_aed: f64, _user_id: &str) -> Result<EscrowHold, GatewayError> {
        Ok(EscrowHold {
            reference: "ESC-1".to_string(),
            status: "held".to_string(),
        })
    }

    async fn release(&self, reference: &str) -> Result<EscrowRelease, GatewayError> {
        self.released
            .lock()
            .expect("released mutex")
            .push(reference.to_string());
        Ok(EscrowRelease {
            status: "released".to_string(),
            reference: Some(reference.to_string()),
        })
    }
}

pub(super) struct Harness {
    pub(super) service: Arc<PaymentService<InMemoryPaymentRepository>>,
    pub(super) repository: Arc<InMemoryPaymentRepository>,
    pub(super) users: Arc<InMemoryUserRepository>,
    pub(super) consent: Arc<InMemoryConsentLedger>,
    pub(super) stripe: Arc<FakeStripe>,
    pub(super) escrow: Arc<FakeEscrow>,
    pub(super) audit: Arc<AuditLogger>,
    _dir: TempDir,
}

pub(super) fn harness_with(stripe: FakeStripe) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let audit = Arc::new(AuditLogger::new(dir.path().join("audit.log")));
    let repository = Arc::new(InMemoryPaymentRepository::new());
    let users = Arc::new(InMemoryUserRepository::new());
    let consent = Arc::new(InMemoryConsentLedger::new());
    let stripe = Arc::new(stripe);
    let escrow = Arc::new(FakeEscrow::default());
    let config = PaymentConfig {
        escrow_hold_days: 7,
        aml_limit_aed: 1_000_000.0,
        site_base_url: "https://site.test".to_string(),
        ..PaymentConfig::default()
    };
    let deps = PaymentDeps {
        users: users.clone(),
        consent: consent.clone(),
        stripe: stripe.clone(),
        escrow: escrow.clone(),
        audit: audit.clone(),
    };
    let service = Arc::new(PaymentService::new(repository.clone(), deps, config));
    Harness {
        service,
        repository,
        users,
        consent,
        stripe,
        escrow,
        audit,
        _dir: dir,
    }
}

pub(super) fn harness() -> Harness {
    harness_with(FakeStripe::default())
}

impl Harness {
    /// Registers a user with the given role and, optionally, PDPL consent.
    pub(super) fn user(&self, id: &str, role: Role, consented: bool) -> Claims {
        let email = format!("{id}@example.com");
        self.users
            .insert(UserRecord::new(
                id.to_string(),
                email.clone(),
                "hash".to_string(),
                role,
            ))
            .expect("user inserted");
        if consented {
            self.consent.set(id, true, fixed_now());
        }
        Claims {
            sub: id.to_string(),
            email,
            role,
            roles: vec![role],
            iat: 0,
            exp: i64::MAX,
        }
    }

    pub(super) fn consent_for(&self, id: &str) {
        self.consent.set(id, true, fixed_now());
    }
}
