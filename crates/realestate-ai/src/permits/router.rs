use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::{PermitRecord, PermitStatus};
use super::service::PermitService;
use crate::audit::{audited, AuditLogger};
use crate::error::json_error;
use crate::i18n::{translate, Lang};

pub const PERMIT_CHECK_ACTION: &str = "PERMIT_CHECK";

#[derive(Debug, thiserror::Error)]
pub enum PermitError {
    #[error("trakheesi_number must be a string")]
    InvalidPayload,
    #[error("trakheesi query parameter is required")]
    MissingTrakheesi,
}

impl IntoResponse for PermitError {
    fn into_response(self) -> Response {
        match self {
            PermitError::InvalidPayload => json_error(StatusCode::BAD_REQUEST, "invalid_payload"),
            PermitError::MissingTrakheesi => {
                json_error(StatusCode::BAD_REQUEST, "missing_trakheesi")
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LangQuery {
    pub lang: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub trakheesi: Option<String>,
    pub lang: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitView {
    pub status: PermitStatus,
    pub expires_at: i64,
    pub message: String,
}

impl PermitView {
    pub fn localized(record: PermitRecord, lang: Lang) -> Self {
        Self {
            status: record.status,
            expires_at: record.expires_at,
            message: translate(lang, record.status.message_key(), &[]),
        }
    }
}

/// Permit endpoints; every call is written to the audit trail.
pub fn permits_router(service: Arc<PermitService>, audit: Arc<AuditLogger>) -> Router {
    let router = Router::new()
        .route("/permits/check", post(check_handler))
        .route("/permits/status", get(status_handler))
        .with_state(service);
    audited(router, audit, None, Some(PERMIT_CHECK_ACTION))
}

pub(crate) async fn check_handler(
    State(service): State<Arc<PermitService>>,
    Query(query): Query<LangQuery>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PermitView>, PermitError> {
    let Json(body) = payload.map_err(|_| PermitError::InvalidPayload)?;
    let trakheesi = body
        .get("trakheesi_number")
        .and_then(Value::as_str)
        .ok_or(PermitError::InvalidPayload)?;

    let record = service.check(trakheesi, Utc::now()).await;
    Ok(Json(PermitView::localized(
        record,
        Lang::resolve(query.lang.as_deref()),
    )))
}

pub(crate) async fn status_handler(
    State(service): State<Arc<PermitService>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<PermitView>, PermitError> {
    let trakheesi = query
        .trakheesi
        .as_deref()
        .filter(|value| !value.is_empty())
        .ok_or(PermitError::MissingTrakheesi)?;

    let record = service.status(trakheesi, Utc::now()).await;
    Ok(Json(PermitView::localized(
        record,
        Lang::resolve(query.lang.as_deref()),
    )))
}
