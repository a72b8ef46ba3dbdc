use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{error, info, warn};

use super::consent_gate::{ConsentError, ConsentGate};
use super::query::SearchParams;
use super::store::{ListingStore, SearchError, SearchPage};
use crate::cache::TtlCache;
use crate::error::{json_error, json_error_with};

pub type SearchCache = TtlCache<SearchPage>;

pub const USER_HEADER: &str = "x-user-id";
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

#[derive(Clone)]
pub struct SearchState {
    pub store: Arc<ListingStore>,
    pub cache: Arc<SearchCache>,
    pub gate: Arc<ConsentGate>,
    pub admin_key: Option<String>,
    pub cache_ttl: Duration,
}

pub(crate) enum SearchFailure {
    Consent(ConsentError),
    Search(String),
    Facets(String),
}

impl IntoResponse for SearchFailure {
    fn into_response(self) -> Response {
        match self {
            SearchFailure::Consent(err) => json_error_with(
                StatusCode::FORBIDDEN,
                "consent_required",
                json!({ "message": err.to_string() }),
            ),
            SearchFailure::Search(message) => json_error_with(
                StatusCode::INTERNAL_SERVER_ERROR,
                "search_failed",
                json!({ "message": message }),
            ),
            SearchFailure::Facets(message) => json_error_with(
                StatusCode::INTERNAL_SERVER_ERROR,
                "facet_failed",
                json!({ "message": message }),
            ),
        }
    }
}

/// `/search`, `/facets`, and the admin cache flush.
pub fn search_router(state: SearchState) -> Router {
    Router::new()
        .route("/search", get(search_handler))
        .route("/facets", get(facets_handler))
        .route("/admin/reindex", post(reindex_handler))
        .with_state(state)
}

async fn check_consent(gate: &ConsentGate, headers: &HeaderMap) -> Result<(), SearchFailure> {
    let user_id = headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok());
    gate.ensure(user_id).await.map_err(|err| {
        warn!(error = %err, "search.consent denied");
        SearchFailure::Consent(err)
    })
}

/// Runs a blocking store call off the async workers.
async fn with_store<T, F>(store: &Arc<ListingStore>, work: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce(&ListingStore) -> Result<T, SearchError> + Send + 'static,
{
    let store = Arc::clone(store);
    match tokio::task::spawn_blocking(move || work(&store)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.to_string()),
        Err(err) => Err(err.to_string()),
    }
}

pub(crate) async fn search_handler(
    State(state): State<SearchState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<SearchPage>, SearchFailure> {
    check_consent(&state.gate, &headers).await?;

    let params = SearchParams::from_query(&query);
    let key = params.cache_key();
    if let Some(page) = state.cache.get(&key) {
        return Ok(Json(page));
    }

    let page = with_store(&state.store, move |store| store.search(&params))
        .await
        .map_err(|message| {
            error!(error = %message, "search.query failed");
            SearchFailure::Search(message)
        })?;
    state.cache.set(key, page.clone(), state.cache_ttl);
    Ok(Json(page))
}

pub(crate) async fn facets_handler(
    State(state): State<SearchState>,
    headers: HeaderMap,
) -> Result<Response, SearchFailure> {
    check_consent(&state.gate, &headers).await?;
    let facets = with_store(&state.store, |store| store.facets())
        .await
        .map_err(|message| {
            error!(error = %message, "search.facets failed");
            SearchFailure::Facets(message)
        })?;
    Ok(Json(facets).into_response())
}

pub(crate) async fn reindex_handler(
    State(state): State<SearchState>,
    headers: HeaderMap,
) -> Response {
    let Some(configured) = state.admin_key.as_deref().filter(|key| !key.is_empty()) else {
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "admin_key_not_configured");
    };
    let provided = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if provided.is_empty() || provided != configured {
        return json_error(StatusCode::UNAUTHORIZED, "unauthorised");
    }

    let cleared = state.cache.flush(None);
    info!(action = "cleared", user = "admin", cleared, "search.cache");
    Json(json!({ "ok": true })).into_response()
}
