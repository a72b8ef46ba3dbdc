use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::response::Response;
use serde_json::Value;

use crate::auth::{AuthService, InMemoryUserRepository, TokenService};
use crate::config::AuthConfig;
use crate::marketing::{MailError, WelcomeMailer};

pub(super) const SECRET: &str = "test-secret";

#[derive(Default)]
pub(super) struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    pub(super) fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }
}

#[async_trait]
impl WelcomeMailer for RecordingMailer {
    async fn send_welcome(&self, email: &str, name: &str) -> Result<(), MailError> {
        self.sent
            .lock()
            .expect("mailer mutex poisoned")
            .push((email.to_string(), name.to_string()));
        Ok(())
    }
}

pub(super) fn auth_config(admin_email: Option<&str>) -> AuthConfig {
    AuthConfig {
        jwt_secret: SECRET.to_string(),
        token_ttl: Duration::from_secs(3600),
        default_admin_email: admin_email.map(str::to_string),
        bcrypt_cost: 4,
        secure_cookies: false,
    }
}

pub(super) fn build_service(
    admin_email: Option<&str>,
) -> (
    Arc<AuthService>,
    Arc<InMemoryUserRepository>,
    Arc<RecordingMailer>,
) {
    let users = Arc::new(InMemoryUserRepository::new());
    let mailer = Arc::new(RecordingMailer::default());
    let tokens = Arc::new(TokenService::new(SECRET, Duration::from_secs(3600)));
    let service = Arc::new(AuthService::new(
        users.clone(),
        tokens,
        mailer.clone(),
        auth_config(admin_email),
    ));
    service.seed_default_agent().expect("seed agent");
    (service, users, mailer)
}

pub(super) async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}

pub(super) fn json_request(method: &str, uri: &str, body: Value) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}
