//! Outbound welcome mail for new accounts.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::config::MarketingConfig;

pub const WELCOME_SENDER: &str = "noreply@realestate.ai";

#[async_trait]
pub trait WelcomeMailer: Send + Sync {
    async fn send_welcome(&self, email: &str, name: &str) -> Result<(), MailError>;
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mail provider rejected the message with status {0}")]
    Rejected(u16),
}

/// Greeting name derived from the local part of an address.
pub fn welcome_name(email: &str) -> &str {
    email.split('@').next().filter(|part| !part.is_empty()).unwrap_or(email)
}

/// SendGrid v3 `mail/send` client.
#[derive(Debug, Clone)]
pub struct SendGridMailer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SendGridMailer {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl WelcomeMailer for SendGridMailer {
    async fn send_welcome(&self, email: &str, name: &str) -> Result<(), MailError> {
        let payload = json!({
            "personalizations": [{ "to": [{ "email": email }] }],
            "from": { "email": WELCOME_SENDER },
            "subject": format!("Welcome {name} to RealEstate AI!"),
            "content": [{
                "type": "text/plain",
                "value": format!("Hi {name}, welcome to RealEstate AI."),
            }],
        });

        let response = self
            .client
            .post(format!("{}/mail/send", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MailError::Rejected(response.status().as_u16()));
        }

        info!(recipient = email, "marketing.welcome_sent");
        Ok(())
    }
}

/// Used when no SendGrid key is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledMailer;

#[async_trait]
impl WelcomeMailer for DisabledMailer {
    async fn send_welcome(&self, email: &str, _name: &str) -> Result<(), MailError> {
        info!(recipient = email, "marketing.welcome_skipped");
        Ok(())
    }
}

pub fn mailer_from_config(config: &MarketingConfig) -> Arc<dyn WelcomeMailer> {
    match &config.sendgrid_api_key {
        Some(key) => Arc::new(SendGridMailer::new(&config.sendgrid_api_base, key)),
        None => Arc::new(DisabledMailer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn welcome_name_uses_local_part() {
        assert_eq!(welcome_name("layla@example.com"), "layla");
        assert_eq!(welcome_name("@example.com"), "@example.com");
    }

    #[tokio::test]
    async fn sendgrid_posts_welcome_payload() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/mail/send")
                    .header("authorization", "Bearer sg-key")
                    .body_contains("Welcome layla to RealEstate AI!")
                    .body_contains(WELCOME_SENDER);
                then.status(202);
            })
            .await;

        let mailer = SendGridMailer::new(server.base_url(), "sg-key");
        mailer
            .send_welcome("layla@example.com", "layla")
            .await
            .expect("mail accepted");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn sendgrid_surfaces_rejection() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/mail/send");
                then.status(401);
            })
            .await;

        let mailer = SendGridMailer::new(server.base_url(), "bad");
        let err = mailer
            .send_welcome("layla@example.com", "layla")
            .await
            .expect_err("rejected");
        assert!(matches!(err, MailError::Rejected(401)));
    }
}
