use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::consent::ConsentRepository;
use super::dsr::{DsrError, DsrService, RectifyRequest, RestrictRequest, SubjectRef};
use crate::audit::{audited, AuditLogger};
use crate::auth::RequireAdmin;
use crate::error::json_error;

pub const DSR_ROUTE_LABEL: &str = "pdpl/dsr";
pub const DSR_ACTION: &str = "DSR";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentUpdate {
    pub user_id: String,
    pub consent: bool,
}

impl IntoResponse for DsrError {
    fn into_response(self) -> Response {
        match self {
            DsrError::InvalidPayload => json_error(StatusCode::BAD_REQUEST, "invalid_payload"),
            DsrError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found"),
            DsrError::EmailInUse => json_error(StatusCode::CONFLICT, "email_in_use"),
        }
    }
}

pub fn consent_router(ledger: Arc<dyn ConsentRepository>) -> Router {
    Router::new()
        .route("/pdpl/consent", post(set_consent_handler))
        .route("/pdpl/consent/:user_id", get(get_consent_handler))
        .with_state(ledger)
}

/// Admin-only data-subject request endpoints, each call audited.
pub fn dsr_router(service: Arc<DsrService>, audit: Arc<AuditLogger>) -> Router {
    let router = Router::new()
        .route("/pdpl/dsr/access", post(access_handler))
        .route("/pdpl/dsr/rectify", post(rectify_handler))
        .route("/pdpl/dsr/erase", post(erase_handler))
        .route("/pdpl/dsr/restrict", post(restrict_handler))
        .with_state(service);
    audited(router, audit, Some(DSR_ROUTE_LABEL), Some(DSR_ACTION))
}

pub(crate) async fn set_consent_handler(
    State(ledger): State<Arc<dyn ConsentRepository>>,
    payload: Result<Json<ConsentUpdate>, JsonRejection>,
) -> Response {
    let update = match payload {
        Ok(Json(update)) if !update.user_id.is_empty() => update,
        _ => return json_error(StatusCode::BAD_REQUEST, "invalid_payload"),
    };

    let record = ledger.set(&update.user_id, update.consent, Utc::now());
    let body = json!({
        "userId": update.user_id,
        "consent": record.consent,
        "timestamp": record.timestamp,
    });
    (StatusCode::CREATED, Json(body)).into_response()
}

pub(crate) async fn get_consent_handler(
    State(ledger): State<Arc<dyn ConsentRepository>>,
    Path(user_id): Path<String>,
) -> Response {
    match ledger.get(&user_id) {
        Some(record) => Json(json!({
            "userId": user_id,
            "consent": record.consent,
            "timestamp": record.timestamp,
        }))
        .into_response(),
        None => json_error(StatusCode::NOT_FOUND, "not_found"),
    }
}

pub(crate) async fn access_handler(
    State(service): State<Arc<DsrService>>,
    RequireAdmin(_admin): RequireAdmin,
    payload: Result<Json<SubjectRef>, JsonRejection>,
) -> Result<Response, DsrError> {
    let Json(request) = payload.map_err(|_| DsrError::InvalidPayload)?;
    Ok(Json(service.access(request)?).into_response())
}

pub(crate) async fn rectify_handler(
    State(service): State<Arc<DsrService>>,
    RequireAdmin(_admin): RequireAdmin,
    payload: Result<Json<RectifyRequest>, JsonRejection>,
) -> Result<Response, DsrError> {
    let Json(request) = payload.map_err(|_| DsrError::InvalidPayload)?;
    let user = service.rectify(request)?;
    Ok(Json(json!({ "user": user })).into_response())
}

pub(crate) async fn erase_handler(
    State(service): State<Arc<DsrService>>,
    RequireAdmin(_admin): RequireAdmin,
    payload: Result<Json<SubjectRef>, JsonRejection>,
) -> Result<Response, DsrError> {
    let Json(request) = payload.map_err(|_| DsrError::InvalidPayload)?;
    let user = service.erase(request)?;
    Ok(Json(json!({ "user": user })).into_response())
}

pub(crate) async fn restrict_handler(
    State(service): State<Arc<DsrService>>,
    RequireAdmin(_admin): RequireAdmin,
    payload: Result<Json<RestrictRequest>, JsonRejection>,
) -> Result<Response, DsrError> {
    let Json(request) = payload.map_err(|_| DsrError::InvalidPayload)?;
    let user = service.restrict(request)?;
    Ok(Json(json!({ "user": user })).into_response())
}
