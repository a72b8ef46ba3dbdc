use crate::infra::{AppState, Services};
use axum::http::{header, StatusCode};
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use realestate_ai::audit::audit_export_router;
use realestate_ai::auth::{auth_router, with_authentication};
use realestate_ai::listing_writer::listing_writer_router;
use realestate_ai::moderation::moderate_listing_content;
use realestate_ai::payments::payments_router;
use realestate_ai::pdpl::{consent_router, dsr_router};
use realestate_ai::permits::permits_router;
use realestate_ai::search::search_router;
use serde_json::json;

const REGION: &str = "me-central-1";

/// Every marketplace router plus the health and metrics endpoints. Moderation screens
/// listing writes after authentication has attached the caller's claims.
pub(crate) fn with_marketplace_routes(services: &Services) -> Router {
    let routes = Router::new()
        .merge(auth_router(services.auth.clone()))
        .merge(permits_router(
            services.permits.clone(),
            services.audit.clone(),
        ))
        .merge(listing_writer_router(services.listing_writer.clone()))
        .merge(consent_router(services.consent.clone()))
        .merge(dsr_router(services.dsr.clone(), services.audit.clone()))
        .merge(payments_router(services.payments.clone()))
        .merge(audit_export_router(services.audit.clone()))
        .merge(search_router(services.search.clone()))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/health", get(service_health))
        .layer(middleware::from_fn_with_state(
            services.moderation.clone(),
            moderate_listing_content,
        ));

    with_authentication(routes, services.tokens.clone())
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

pub(crate) async fn service_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "api", "region": REGION }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
