use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

use super::compliance::{aml_check, log_compliance};
use super::domain::{
    ConnectRequest, ConnectResponse, DashboardSummary, EscrowRelease, InitiateRequest,
    InitiateResponse, NewPayment, PaymentStatus, PaymentView, ReleaseOutcome, ReleasedPayment,
    StatusBucket,
};
use super::gateway::{EscrowGateway, GatewayError, StripeGateway};
use super::repository::PaymentRepository;
use crate::audit::AuditLogger;
use crate::auth::{Claims, Role, UserRepository, UserStoreError};
use crate::config::PaymentConfig;
use crate::pdpl::ConsentRepository;

/// Collaborators the payment service calls out to.
#[derive(Clone)]
pub struct PaymentDeps {
    pub users: Arc<dyn UserRepository>,
    pub consent: Arc<dyn ConsentRepository>,
    pub stripe: Arc<dyn StripeGateway>,
    pub escrow: Arc<dyn EscrowGateway>,
    pub audit: Arc<AuditLogger>,
}

/// Stripe Connect onboarding, escrowed checkout, and release flows.
pub struct PaymentService<R> {
    repository: Arc<R>,
    deps: PaymentDeps,
    config: PaymentConfig,
}

fn valid_currency(currency: &str) -> bool {
    currency.len() == 3 && currency.bytes().all(|byte| byte.is_ascii_alphabetic())
}

fn valid_url(raw: &str) -> bool {
    reqwest::Url::parse(raw).is_ok()
}

impl<R> PaymentService<R>
where
    R: PaymentRepository + 'static,
{
    pub fn new(repository: Arc<R>, deps: PaymentDeps, config: PaymentConfig) -> Self {
        Self {
            repository,
            deps,
            config,
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    fn require_consent(&self, claims: &Claims) -> Result<(), PaymentError> {
        if self.deps.consent.has_consented(&claims.sub) {
            Ok(())
        } else {
            Err(PaymentError::ConsentRequired)
        }
    }

    fn require_user(&self, claims: &Claims) -> Result<(), PaymentError> {
        match self.deps.users.get(&claims.sub)? {
            Some(_) => Ok(()),
            None => Err(PaymentError::UserNotFound),
        }
    }

    pub async fn connect(
        &self,
        claims: &Claims,
        request: ConnectRequest,
    ) -> Result<ConnectResponse, PaymentError> {
        if !(claims.has_role(Role::Agent) || claims.is_admin()) {
            return Err(PaymentError::Forbidden);
        }
        self.require_consent(claims)?;
        self.require_user(claims)?;
        if [&request.return_url, &request.refresh_url]
            .into_iter()
            .flatten()
            .any(|url| !valid_url(url))
        {
            return Err(PaymentError::InvalidPayload);
        }

        let account = self
            .deps
            .stripe
            .create_account(&claims.email)
            .await
            .map_err(PaymentError::Stripe)?;
        self.deps
            .users
            .link_stripe_account(&claims.sub, &account.id)?;

        let base = self.config.site_base_url.trim_end_matches('/');
        let return_url = request
            .return_url
            .unwrap_or_else(|| format!("{base}/finance/onboarding/success"));
        let refresh_url = request
            .refresh_url
            .unwrap_or_else(|| format!("{base}/finance/onboarding/retry"));
        let link = self
            .deps
            .stripe
            .create_account_link(&account.id, &return_url, &refresh_url)
            .await
            .map_err(PaymentError::Stripe)?;

        info!(user_id = %claims.sub, account_id = %account.id, "payments.connect");
        Ok(ConnectResponse {
            account_id: account.id,
            onboarding_link: link.url,
            expires_at: link.expires_at,
        })
    }

    pub async fn initiate(
        &self,
        claims: &Claims,
        request: InitiateRequest,
        now: DateTime<Utc>,
    ) -> Result<InitiateResponse, PaymentError> {
        self.require_consent(claims)?;
        self.require_user(claims)?;
        self.checkout(claims, request, now).await
    }

    /// Like [`Self::initiate`] for an unparsed body: consent and account
    /// checks answer before the payload is validated. `None` stands for a
    /// body that was not JSON at all.
    pub async fn initiate_payload(
        &self,
        claims: &Claims,
        payload: Option<Value>,
        now: DateTime<Utc>,
    ) -> Result<InitiateResponse, PaymentError> {
        self.require_consent(claims)?;
        self.require_user(claims)?;
        let request = payload
            .and_then(|body| serde_json::from_value::<InitiateRequest>(body).ok())
            .ok_or(PaymentError::InvalidPayload)?;
        self.checkout(claims, request, now).await
    }

    async fn checkout(
        &self,
        claims: &Claims,
        request: InitiateRequest,
        now: DateTime<Utc>,
    ) -> Result<InitiateResponse, PaymentError> {
        let amount_aed = request.amount_aed;
        if !amount_aed.is_finite() || amount_aed < 1.0 {
            return Err(PaymentError::InvalidPayload);
        }
        let currency = request.currency.unwrap_or_else(|| "aed".to_string());
        if !valid_currency(&currency) {
            return Err(PaymentError::InvalidPayload);
        }
        let currency = currency.to_ascii_lowercase();

        let aml = aml_check(amount_aed, &claims.sub, self.config.aml_limit_aed);
        log_compliance(&self.deps.audit, &aml, amount_aed, &claims.sub).await;

        let intent = self
            .deps
            .stripe
            .create_payment_intent(amount_aed, &currency)
            .await
            .map_err(PaymentError::Payment)?;
        let escrow = self
            .deps
            .escrow
            .hold(amount_aed, &claims.sub)
            .await
            .map_err(PaymentError::Payment)?;

        let status = if aml.flag {
            PaymentStatus::Flagged
        } else {
            PaymentStatus::Escrowed
        };
        let payment = self.repository.create(
            NewPayment {
                user_id: claims.sub.clone(),
                amount_aed,
                status,
                stripe_payment_id: Some(intent.id.clone()),
                bank_escrow_ref: Some(escrow.reference.clone()),
                aml: Some(aml),
            },
            now,
        );

        info!(
            payment_id = %payment.id,
            user_id = %claims.sub,
            amount_aed,
            status = status.label(),
            "payments.initiate"
        );
        Ok(InitiateResponse {
            id: payment.id,
            status,
            stripe_payment_id: intent.id,
            client_secret: intent.client_secret,
            escrow_ref: escrow.reference,
            aml,
        })
    }

    /// Owners may release once the hold period has elapsed; admins at any time.
    pub async fn release(
        &self,
        claims: &Claims,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ReleaseOutcome, PaymentError> {
        let payment = self
            .repository
            .get(payment_id)
            .ok_or(PaymentError::NotFound)?;
        let release_available_at = payment.release_available_at(self.config.escrow_hold_days);

        if !claims.is_admin() {
            if payment.user_id != claims.sub {
                return Err(PaymentError::Forbidden);
            }
            if now < release_available_at {
                return Err(PaymentError::EscrowHoldActive {
                    release_available_at,
                });
            }
        }

        if payment.status == PaymentStatus::Released {
            return Ok(ReleaseOutcome::AlreadyReleased {
                released: EscrowRelease {
                    status: "already_released".to_string(),
                    reference: payment.bank_escrow_ref,
                },
            });
        }

        let reference = payment
            .bank_escrow_ref
            .as_deref()
            .ok_or(PaymentError::MissingEscrowReference)?;
        let released = self
            .deps
            .escrow
            .release(reference)
            .await
            .map_err(PaymentError::Escrow)?;

        let updated = self
            .repository
            .update_status(&payment.id, PaymentStatus::Released, now);
        if updated.is_none() {
            warn!(payment_id = %payment.id, "payments.release record vanished during release");
        }

        info!(
            payment_id = %payment.id,
            user_id = %claims.sub,
            release_status = %released.status,
            "payments.release"
        );
        Ok(ReleaseOutcome::Released {
            released,
            payment: ReleasedPayment {
                id: payment.id.clone(),
                status: PaymentStatus::Released,
                updated_at: updated.map(|record| record.updated_at).unwrap_or(now),
            },
        })
    }

    pub fn list_mine(&self, claims: &Claims) -> Result<Vec<PaymentView>, PaymentError> {
        self.require_consent(claims)?;
        Ok(self
            .repository
            .list_for_user(&claims.sub)
            .iter()
            .map(|payment| payment.view())
            .collect())
    }

    pub fn dashboard_summary(&self, now: DateTime<Utc>) -> DashboardSummary {
        let mut summary: BTreeMap<PaymentStatus, StatusBucket> = BTreeMap::new();
        let mut totals = StatusBucket::default();
        for payment in self.repository.list_all() {
            summary
                .entry(payment.status)
                .or_default()
                .add(payment.amount_aed);
            totals.add(payment.amount_aed);
        }
        DashboardSummary {
            summary,
            totals,
            generated_at: now,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("invalid payload")]
    InvalidPayload,
    #[error("caller may not perform this payment action")]
    Forbidden,
    #[error("PDPL consent is required")]
    ConsentRequired,
    #[error("user not found")]
    UserNotFound,
    #[error("payment not found")]
    NotFound,
    #[error("escrow hold active until {release_available_at}")]
    EscrowHoldActive { release_available_at: DateTime<Utc> },
    #[error("payment has no escrow reference")]
    MissingEscrowReference,
    #[error("stripe onboarding failed: {0}")]
    Stripe(#[source] GatewayError),
    #[error("payment processing failed: {0}")]
    Payment(#[source] GatewayError),
    #[error("escrow release failed: {0}")]
    Escrow(#[source] GatewayError),
    #[error(transparent)]
    Users(#[from] UserStoreError),
}
