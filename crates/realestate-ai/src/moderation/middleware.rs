use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use serde_json::{json, Value};
use tracing::info;

use super::service::ModerationService;
use crate::auth::Claims;
use crate::error::{json_error, json_error_with};

const MODERATED_KEYS: &[&str] = &[
    "title",
    "titleHints",
    "description",
    "text",
    "content",
    "message",
];
const MAX_MODERATED_BODY: usize = 1024 * 1024;

fn applies_to(method: &Method, path: &str) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
        && path.to_ascii_lowercase().contains("listing")
}

/// Strings (and string array items) under the moderated keys; a bare string
/// body counts as a single candidate.
pub fn collect_candidate_text(body: &Value) -> Vec<String> {
    match body {
        Value::String(text) => vec![text.clone()],
        Value::Object(fields) => fields
            .iter()
            .filter(|(key, _)| MODERATED_KEYS.contains(&key.as_str()))
            .flat_map(|(_, value)| match value {
                Value::String(text) => vec![text.clone()],
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                _ => Vec::new(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Screens listing writes; flagged content is refused for everyone but admins.
pub async fn moderate_listing_content(
    State(service): State<Arc<ModerationService>>,
    request: Request,
    next: Next,
) -> Response {
    if !applies_to(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_MODERATED_BODY).await {
        Ok(bytes) => bytes,
        Err(_) => return json_error(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
    };

    let texts = serde_json::from_slice::<Value>(&bytes)
        .map(|body| collect_candidate_text(&body))
        .unwrap_or_default();
    if texts.is_empty() {
        return next.run(Request::from_parts(parts, Body::from(bytes))).await;
    }

    let result = service.moderate(&texts.join("\n"), None);
    let is_admin = parts
        .extensions
        .get::<Claims>()
        .is_some_and(Claims::is_admin);

    if result.enabled && result.flagged && !is_admin {
        info!(reasons = ?result.reasons, path = %parts.uri.path(), "moderation.flagged");
        return json_error_with(
            StatusCode::UNPROCESSABLE_ENTITY,
            "content_flagged",
            json!({ "details": result }),
        );
    }

    parts.extensions.insert(result);
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_strings_and_string_arrays_from_known_keys() {
        let body = json!({
            "titleHints": "Palm villa",
            "features": ["ignored"],
            "content": ["one", 2, "three"],
            "price": 100
        });
        let mut texts = collect_candidate_text(&body);
        texts.sort();
        assert_eq!(texts, vec!["Palm villa", "one", "three"]);
    }

    #[test]
    fn only_listing_writes_are_moderated() {
        assert!(applies_to(&Method::POST, "/nlp/Listing-writer"));
        assert!(applies_to(&Method::PATCH, "/listings/1"));
        assert!(!applies_to(&Method::GET, "/listings"));
        assert!(!applies_to(&Method::POST, "/payments/initiate"));
    }
}
