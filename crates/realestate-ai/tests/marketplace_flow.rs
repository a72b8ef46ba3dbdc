use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::middleware;
use axum::response::Response;
use axum::Router;
use httpmock::prelude::*;
use realestate_ai::audit::{audit_export_router, AuditLogger};
use realestate_ai::auth::{
    auth_router, with_authentication, AuthService, InMemoryUserRepository, TokenService,
};
use realestate_ai::config::{AuthConfig, ModerationConfig, PaymentConfig};
use realestate_ai::listing_writer::{listing_writer_router, ListingWriterService};
use realestate_ai::marketing::DisabledMailer;
use realestate_ai::moderation::{moderate_listing_content, ModerationService};
use realestate_ai::payments::{
    payments_router, BankEscrowClient, InMemoryPaymentRepository, PaymentDeps, PaymentService,
    StripeClient,
};
use realestate_ai::pdpl::{consent_router, InMemoryConsentLedger};
use realestate_ai::permits::{permits_router, MockPermitProvider, PermitService};
use serde_json::{json, Value};
use tower::ServiceExt;

const ADMIN_EMAIL: &str = "ops@realestate.ae";

struct Marketplace {
    router: Router,
    audit_path: PathBuf,
    _dir: tempfile::TempDir,
}

fn marketplace(server: &MockServer) -> Marketplace {
    let dir = tempfile::tempdir().expect("tempdir");
    let audit_path = dir.path().join("audit.log");

    let users = Arc::new(InMemoryUserRepository::new());
    let ledger = Arc::new(InMemoryConsentLedger::new());
    let tokens = Arc::new(TokenService::new("flow-secret", Duration::from_secs(3600)));
    let audit = Arc::new(AuditLogger::new(&audit_path));
    let permits = Arc::new(PermitService::new(Arc::new(MockPermitProvider)));

    let auth = Arc::new(AuthService::new(
        users.clone(),
        tokens.clone(),
        Arc::new(DisabledMailer),
        AuthConfig {
            bcrypt_cost: 4,
            default_admin_email: Some(ADMIN_EMAIL.to_string()),
            ..AuthConfig::default()
        },
    ));
    let payments = Arc::new(PaymentService::new(
        Arc::new(InMemoryPaymentRepository::new()),
        PaymentDeps {
            users,
            consent: ledger.clone(),
            stripe: Arc::new(StripeClient::new(
                server.url("/stripe"),
                Some("sk_test_flow".to_string()),
            )),
            escrow: Arc::new(BankEscrowClient::new(server.url("/bank"), None)),
            audit: audit.clone(),
        },
        PaymentConfig::default(),
    ));
    let moderation = Arc::new(ModerationService::new(ModerationConfig::default()));

    let routes = Router::new()
        .merge(auth_router(auth))
        .merge(permits_router(permits.clone(), audit.clone()))
        .merge(listing_writer_router(Arc::new(ListingWriterService::new(permits))))
        .merge(consent_router(ledger))
        .merge(payments_router(payments))
        .merge(audit_export_router(audit))
        .layer(middleware::from_fn_with_state(moderation, moderate_listing_content));

    Marketplace {
        router: with_authentication(routes, tokens),
        audit_path,
        _dir: dir,
    }
}

impl Marketplace {
    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(body) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).expect("request builds"))
            .await
            .expect("response")
    }

    async fn register(&self, email: &str, role: Option<&str>) -> (String, String) {
        let mut body = json!({ "email": email, "password": "correct-horse" });
        if let Some(role) = role {
            body["role"] = json!(role);
        }
        let response = self.send("POST", "/auth/register", None, Some(body)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let session = json_body(response).await;
        (
            session["token"].as_str().expect("token").to_string(),
            session["user"]["id"].as_str().expect("user id").to_string(),
        )
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn agent_lists_a_property_and_takes_an_escrowed_payment() {
    let server = MockServer::start_async().await;
    let intent = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/stripe/payment_intents")
                .header("authorization", "Bearer sk_test_flow")
                .body_contains("amount=25000000")
                .body_contains("currency=aed");
            then.status(200)
                .json_body(json!({ "id": "pi_flow", "client_secret": "pi_flow_secret" }));
        })
        .await;
    let hold = server
        .mock_async(|when, then| {
            when.method(POST).path("/bank/escrow/hold");
            then.status(200).json_body(json!({ "ref": "ESC-42", "status": "held" }));
        })
        .await;
    let app = marketplace(&server);

    let (agent_token, agent_id) = app.register("agent.one@realestate.ae", Some("agent")).await;

    let permit = app
        .send(
            "POST",
            "/permits/check",
            None,
            Some(json!({ "trakheesi_number": "12345678" })),
        )
        .await;
    assert_eq!(permit.status(), StatusCode::OK);
    assert_eq!(json_body(permit).await["status"], "valid");

    let draft = app
        .send(
            "POST",
            "/nlp/listing-writer?lang=ar",
            Some(&agent_token),
            Some(json!({
                "trakheesi_number": "12345678",
                "titleHints": "Marina duplex",
                "features": ["Sea view", "Private pool"],
                "language": "ar"
            })),
        )
        .await;
    assert_eq!(draft.status(), StatusCode::OK);
    let draft = json_body(draft).await;
    assert_eq!(draft["permit_status"], "valid");
    assert!(draft["text"].as_str().expect("text").contains("Marina duplex"));

    let flagged = app
        .send(
            "POST",
            "/nlp/listing-writer",
            Some(&agent_token),
            Some(json!({ "trakheesi_number": "12345678", "titleHints": "Not a scam" })),
        )
        .await;
    assert_eq!(flagged.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(flagged).await["error"], "content_flagged");

    let blocked = app
        .send(
            "POST",
            "/payments/initiate",
            Some(&agent_token),
            Some(json!({ "amount_aed": 250000 })),
        )
        .await;
    assert_eq!(blocked.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(blocked).await["error"], "consent_required");

    let consent = app
        .send(
            "POST",
            "/pdpl/consent",
            None,
            Some(json!({ "userId": agent_id, "consent": true })),
        )
        .await;
    assert_eq!(consent.status(), StatusCode::CREATED);

    let initiated = app
        .send(
            "POST",
            "/payments/initiate",
            Some(&agent_token),
            Some(json!({ "amount_aed": 250000, "currency": "AED" })),
        )
        .await;
    assert_eq!(initiated.status(), StatusCode::CREATED);
    let initiated = json_body(initiated).await;
    assert_eq!(initiated["status"], "escrowed");
    assert_eq!(initiated["escrowRef"], "ESC-42");
    assert_eq!(initiated["clientSecret"], "pi_flow_secret");
    intent.assert_async().await;
    hold.assert_async().await;

    let release = app
        .send(
            "POST",
            &format!("/payments/escrow/{}/release", initiated["id"].as_str().expect("id")),
            Some(&agent_token),
            None,
        )
        .await;
    assert_eq!(release.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let release = json_body(release).await;
    assert_eq!(release["error"], "escrow_hold_active");
    assert!(release["releaseAvailableAt"].is_string());

    let mine = app.send("GET", "/payments/me", Some(&agent_token), None).await;
    assert_eq!(mine.status(), StatusCode::OK);
    assert_eq!(json_body(mine).await["payments"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn only_the_configured_admin_reads_dashboards_and_audit_exports() {
    let server = MockServer::start_async().await;
    let app = marketplace(&server);

    let (buyer_token, _) = app.register("buyer@realestate.ae", None).await;
    let (admin_token, _) = app.register(ADMIN_EMAIL, None).await;

    let permit = app
        .send(
            "POST",
            "/permits/check",
            Some(&buyer_token),
            Some(json!({ "trakheesi_number": "12345670" })),
        )
        .await;
    assert_eq!(json_body(permit).await["status"], "invalid");

    let denied = app
        .send("GET", "/payments/dashboard/summary", Some(&buyer_token), None)
        .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let summary = app
        .send("GET", "/payments/dashboard/summary", Some(&admin_token), None)
        .await;
    assert_eq!(summary.status(), StatusCode::OK);
    assert_eq!(json_body(summary).await["totals"]["count"], 0);

    let denied = app.send("GET", "/audit/export", Some(&buyer_token), None).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let export = app.send("GET", "/audit/export", Some(&admin_token), None).await;
    assert_eq!(export.status(), StatusCode::OK);
    assert_eq!(
        export.headers()[header::CONTENT_TYPE],
        "application/x-ndjson"
    );
    let bytes = to_bytes(export.into_body(), usize::MAX)
        .await
        .expect("body readable");
    let lines: Vec<Value> = String::from_utf8_lossy(&bytes)
        .lines()
        .map(|line| serde_json::from_str(line).expect("ndjson line"))
        .collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["action"], "PERMIT_CHECK");
    assert_eq!(lines[0]["status"], 200);
    assert!(lines[0]["userId"].is_string());
    assert!(app.audit_path.exists());
}
