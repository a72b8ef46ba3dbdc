use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::error;

use super::domain::{AuthSession, Credentials, ProfilePatch, Registration};
use super::extract::{session_cookie, RequireUser};
use super::service::{AuthError, AuthService};
use crate::error::json_error;

/// Router exposing registration, login, and profile endpoints.
pub fn auth_router(service: Arc<AuthService>) -> Router {
    Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/me", get(me_handler))
        .route("/profile", get(profile_handler).patch(update_profile_handler))
        .with_state(service)
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::InvalidPayload => json_error(StatusCode::BAD_REQUEST, "invalid_payload"),
            AuthError::AccountExists => json_error(StatusCode::CONFLICT, "account_exists"),
            AuthError::Unauthorized => json_error(StatusCode::UNAUTHORIZED, "unauthorized"),
            AuthError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found"),
            other => {
                error!(error = %other, "auth.failure");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "server_error")
            }
        }
    }
}

fn session_response(service: &AuthService, status: StatusCode, session: AuthSession) -> Response {
    let cookie = session_cookie(
        &session.token,
        service.tokens().ttl().as_secs(),
        service.secure_cookies(),
    );
    (status, [(header::SET_COOKIE, cookie)], Json(session)).into_response()
}

pub(crate) async fn register_handler(
    State(service): State<Arc<AuthService>>,
    payload: Result<Json<Registration>, JsonRejection>,
) -> Result<Response, AuthError> {
    let Json(registration) = payload.map_err(|_| AuthError::InvalidPayload)?;
    let session = service.register(registration).await?;
    Ok(session_response(&service, StatusCode::CREATED, session))
}

pub(crate) async fn login_handler(
    State(service): State<Arc<AuthService>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, AuthError> {
    let Json(credentials) = payload.map_err(|_| AuthError::InvalidPayload)?;
    let session = service.login(credentials)?;
    Ok(session_response(&service, StatusCode::OK, session))
}

pub(crate) async fn me_handler(
    State(service): State<Arc<AuthService>>,
    RequireUser(claims): RequireUser,
) -> Result<Response, AuthError> {
    Ok(Json(service.me(&claims)?).into_response())
}

pub(crate) async fn profile_handler(
    State(service): State<Arc<AuthService>>,
    RequireUser(claims): RequireUser,
) -> Result<Response, AuthError> {
    Ok(Json(service.profile(&claims)?).into_response())
}

pub(crate) async fn update_profile_handler(
    State(service): State<Arc<AuthService>>,
    RequireUser(claims): RequireUser,
    payload: Result<Json<ProfilePatch>, JsonRejection>,
) -> Result<Response, AuthError> {
    let Json(patch) = payload.map_err(|_| AuthError::InvalidPayload)?;
    Ok(Json(service.update_profile(&claims, patch)?).into_response())
}
