use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use tracing::warn;

use super::logger::{AuditEvent, AuditLogger};
use crate::auth::Claims;
use crate::error::json_error;

const MAX_AUDITED_BODY: usize = 1024 * 1024;

/// Route label and action attached to every record a layer writes.
#[derive(Debug, Clone)]
pub struct AuditScope {
    pub logger: Arc<AuditLogger>,
    pub route: Option<&'static str>,
    pub action: Option<&'static str>,
}

/// Applies [`record_audit`] to every route matched by `router`.
pub fn audited(
    router: Router,
    logger: Arc<AuditLogger>,
    route: Option<&'static str>,
    action: Option<&'static str>,
) -> Router {
    let scope = AuditScope {
        logger,
        route,
        action,
    };
    router.route_layer(middleware::from_fn_with_state(scope, record_audit))
}

/// Captures the JSON request and response bodies and appends an audit record
/// once the inner handler has produced its response.
pub async fn record_audit(
    State(scope): State<AuditScope>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let route = scope
        .route
        .map(str::to_string)
        .unwrap_or_else(|| request.uri().path().to_string());
    let user_id = request
        .extensions()
        .get::<Claims>()
        .map(|claims| claims.sub.clone());

    let (parts, body) = request.into_parts();
    let request_bytes = match to_bytes(body, MAX_AUDITED_BODY).await {
        Ok(bytes) => bytes,
        Err(_) => return json_error(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
    };
    let request_json = serde_json::from_slice::<Value>(&request_bytes).ok();
    let request = Request::from_parts(parts, Body::from(request_bytes));

    let response = next.run(request).await;
    let (parts, body) = response.into_parts();
    let response_bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "audit.response_unreadable");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "server_error");
        }
    };
    let result = serde_json::from_slice::<Value>(&response_bytes).ok();
    let status = parts.status.as_u16();
    let response = Response::from_parts(parts, Body::from(response_bytes));

    let event = AuditEvent {
        route,
        method,
        status,
        body: request_json,
        result,
        user_id,
        action: scope.action.map(str::to_string),
    };
    if let Err(err) = scope.logger.log(event).await {
        warn!(error = %err, "audit.write_failed");
    }

    response
}
