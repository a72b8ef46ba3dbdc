use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use super::domain::Claims;
use super::token::TokenService;
use crate::error::json_error;

pub const SESSION_COOKIE: &str = "id_token";

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
}

fn cookie_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token)
        .filter(|token| !token.is_empty())
}

/// Verifies a bearer or cookie token and stores its [`Claims`] in the request
/// extensions. Requests without a usable token continue anonymously.
pub async fn authenticate(
    State(tokens): State<Arc<TokenService>>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::OPTIONS {
        let token = bearer_token(request.headers()).or_else(|| cookie_token(request.headers()));
        if let Some(claims) = token.and_then(|token| tokens.verify(token).ok()) {
            request.extensions_mut().insert(claims);
        }
    }
    next.run(request).await
}

/// Set-Cookie value carrying a session token.
pub fn session_cookie(token: &str, max_age_secs: u64, secure: bool) -> String {
    let mut cookie =
        format!("{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_secs}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Rejects anonymous requests with 401.
#[derive(Debug, Clone)]
pub struct RequireUser(pub Claims);

/// Rejects anonymous requests with 401 and non-admins with 403.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub Claims);

#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Claims>);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequireUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(RequireUser)
            .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "unauthorized"))
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequireAdmin {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireUser(claims) = RequireUser::from_request_parts(parts, state).await?;
        if !claims.is_admin() {
            return Err(json_error(StatusCode::FORBIDDEN, "forbidden"));
        }
        Ok(RequireAdmin(claims))
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<Claims>().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("id_token=xyz"));
        let token = bearer_token(&headers).or_else(|| cookie_token(&headers));
        assert_eq!(token, Some("abc"));
    }

    #[test]
    fn cookie_token_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; id_token=xyz; lang=ar"),
        );
        assert_eq!(cookie_token(&headers), Some("xyz"));
    }

    #[test]
    fn secure_flag_only_when_requested() {
        assert!(!session_cookie("t", 60, false).contains("Secure"));
        assert!(session_cookie("t", 60, true).ends_with("; Secure"));
    }
}
