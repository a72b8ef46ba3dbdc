//! Accounts, session tokens, and the request extractors other routers use to
//! read the caller's identity.

pub mod domain;
pub mod extract;
pub mod router;
pub mod service;
pub mod store;
pub mod token;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::middleware;
use axum::Router;

pub use domain::{
    AccountView, AuthSession, Claims, Credentials, ProfilePatch, ProfileView, Rectification,
    Registration, Role, UserRecord, UserSummary,
};
pub use extract::{authenticate, MaybeUser, RequireAdmin, RequireUser, SESSION_COOKIE};
pub use router::auth_router;
pub use service::{AuthError, AuthService, DEFAULT_AGENT_EMAIL};
pub use store::{InMemoryUserRepository, UserRepository, UserStoreError};
pub use token::{TokenError, TokenService};

/// Wraps `router` so every request passes through [`authenticate`] first.
pub fn with_authentication(router: Router, tokens: Arc<TokenService>) -> Router {
    router.layer(middleware::from_fn_with_state(tokens, authenticate))
}
