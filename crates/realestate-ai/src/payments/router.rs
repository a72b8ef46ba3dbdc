use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::error;

use super::domain::ConnectRequest;
use super::repository::PaymentRepository;
use super::service::{PaymentError, PaymentService};
use crate::auth::{RequireAdmin, RequireUser};
use crate::error::{json_error, json_error_with};

/// Router exposing Connect onboarding, checkout, escrow release, and the
/// admin dashboard.
pub fn payments_router<R>(service: Arc<PaymentService<R>>) -> Router
where
    R: PaymentRepository + 'static,
{
    Router::new()
        .route("/payments/connect", post(connect_handler::<R>))
        .route("/payments/initiate", post(initiate_handler::<R>))
        .route("/payments/escrow/:id/release", post(release_handler::<R>))
        .route("/payments/me", get(list_mine_handler::<R>))
        .route("/payments/dashboard/summary", get(dashboard_handler::<R>))
        .with_state(service)
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        match self {
            PaymentError::InvalidPayload => {
                json_error(StatusCode::BAD_REQUEST, "invalid_payload")
            }
            PaymentError::Forbidden => json_error(StatusCode::FORBIDDEN, "forbidden"),
            PaymentError::ConsentRequired => {
                json_error(StatusCode::FORBIDDEN, "consent_required")
            }
            PaymentError::UserNotFound => json_error(StatusCode::NOT_FOUND, "user_not_found"),
            PaymentError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found"),
            PaymentError::EscrowHoldActive {
                release_available_at,
            } => json_error_with(
                StatusCode::UNPROCESSABLE_ENTITY,
                "escrow_hold_active",
                json!({ "releaseAvailableAt": release_available_at }),
            ),
            PaymentError::MissingEscrowReference => {
                json_error(StatusCode::CONFLICT, "missing_escrow_reference")
            }
            PaymentError::Stripe(err) => {
                error!(error = %err, "payments.connect failed to create connect account");
                json_error(StatusCode::BAD_GATEWAY, "stripe_error")
            }
            PaymentError::Payment(err) => {
                error!(error = %err, "payments.initiate failed to process payment");
                json_error(StatusCode::BAD_GATEWAY, "payment_error")
            }
            PaymentError::Escrow(err) => {
                error!(error = %err, "payments.release failed to release escrow");
                json_error(StatusCode::BAD_GATEWAY, "escrow_error")
            }
            PaymentError::Users(err) => {
                error!(error = %err, "payments.user_store");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "server_error")
            }
        }
    }
}

pub(crate) async fn connect_handler<R>(
    State(service): State<Arc<PaymentService<R>>>,
    RequireUser(claims): RequireUser,
    payload: Result<Json<ConnectRequest>, JsonRejection>,
) -> Result<Response, PaymentError>
where
    R: PaymentRepository + 'static,
{
    // Both URLs are optional, so a bodiless request is accepted.
    let request = match payload {
        Ok(Json(request)) => request,
        Err(JsonRejection::MissingJsonContentType(_)) => ConnectRequest::default(),
        Err(_) => return Err(PaymentError::InvalidPayload),
    };
    let connected = service.connect(&claims, request).await?;
    Ok((StatusCode::CREATED, Json(connected)).into_response())
}

pub(crate) async fn initiate_handler<R>(
    State(service): State<Arc<PaymentService<R>>>,
    RequireUser(claims): RequireUser,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, PaymentError>
where
    R: PaymentRepository + 'static,
{
    let body = payload.ok().map(|Json(body)| body);
    let initiated = service.initiate_payload(&claims, body, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(initiated)).into_response())
}

pub(crate) async fn release_handler<R>(
    State(service): State<Arc<PaymentService<R>>>,
    RequireUser(claims): RequireUser,
    Path(payment_id): Path<String>,
) -> Result<Response, PaymentError>
where
    R: PaymentRepository + 'static,
{
    let outcome = service.release(&claims, &payment_id, Utc::now()).await?;
    Ok(Json(outcome).into_response())
}

pub(crate) async fn list_mine_handler<R>(
    State(service): State<Arc<PaymentService<R>>>,
    RequireUser(claims): RequireUser,
) -> Result<Response, PaymentError>
where
    R: PaymentRepository + 'static,
{
    let payments = service.list_mine(&claims)?;
    Ok(Json(json!({ "payments": payments })).into_response())
}

pub(crate) async fn dashboard_handler<R>(
    State(service): State<Arc<PaymentService<R>>>,
    RequireAdmin(_admin): RequireAdmin,
) -> Response
where
    R: PaymentRepository + 'static,
{
    Json(service.dashboard_summary(Utc::now())).into_response()
}
