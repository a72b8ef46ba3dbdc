use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;

use super::service::{ListingRequest, ListingWriterError, ListingWriterService};
use crate::auth::RequireUser;
use crate::error::{json_error, json_error_with};
use crate::i18n::{translate, Lang};
use crate::permits::router::LangQuery;

pub fn listing_writer_router(service: Arc<ListingWriterService>) -> Router {
    Router::new()
        .route("/nlp/listing-writer", post(draft_handler))
        .with_state(service)
}

pub(crate) async fn draft_handler(
    State(service): State<Arc<ListingWriterService>>,
    RequireUser(_claims): RequireUser,
    Query(query): Query<LangQuery>,
    payload: Result<Json<ListingRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = payload else {
        return json_error(StatusCode::BAD_REQUEST, "invalid_payload");
    };

    match service.draft(request, Utc::now()).await {
        Ok(draft) => Json(draft).into_response(),
        Err(ListingWriterError::PermitNotValid(permit)) => {
            let lang = Lang::resolve(query.lang.as_deref());
            json_error_with(
                StatusCode::UNPROCESSABLE_ENTITY,
                "permit_not_valid",
                json!({
                    "status": permit.status,
                    "message": translate(lang, "listing.invalidPermit", &[]),
                }),
            )
        }
    }
}
