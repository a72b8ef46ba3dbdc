use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::i18n::{translate, Lang};
use crate::permits::{PermitRecord, PermitService, PermitStatus};

#[derive(Debug, Clone, Deserialize)]
pub struct ListingRequest {
    #[serde(default, rename = "titleHints")]
    pub title_hints: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    pub trakheesi_number: String,
    #[serde(default)]
    pub language: Lang,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingDraft {
    pub text: String,
    pub toxicity_flag: bool,
    pub permit_status: PermitStatus,
    #[serde(rename = "expiresAt")]
    pub expires_at: i64,
    pub message: String,
    pub language: Lang,
}

#[derive(Debug, thiserror::Error)]
pub enum ListingWriterError {
    #[error("permit is {}", .0.status.label())]
    PermitNotValid(PermitRecord),
}

/// Drafts localized listing copy for permits that are currently valid.
pub struct ListingWriterService {
    permits: Arc<PermitService>,
}

impl ListingWriterService {
    pub fn new(permits: Arc<PermitService>) -> Self {
        Self { permits }
    }

    pub async fn draft(
        &self,
        request: ListingRequest,
        now: DateTime<Utc>,
    ) -> Result<ListingDraft, ListingWriterError> {
        let permit = self.permits.status(&request.trakheesi_number, now).await;
        if permit.status != PermitStatus::Valid {
            return Err(ListingWriterError::PermitNotValid(permit));
        }

        let lang = request.language;
        let headline = request
            .title_hints
            .clone()
            .unwrap_or_else(|| translate(lang, "listing.defaultHeadline", &[]));
        let features = if request.features.is_empty() {
            translate(lang, "listing.noFeatures", &[])
        } else {
            request.features.join(", ")
        };

        let text = translate(
            lang,
            "listing.summary",
            &[
                ("trakheesi", request.trakheesi_number.as_str()),
                ("headline", headline.as_str()),
                ("features", features.as_str()),
            ],
        );

        Ok(ListingDraft {
            text,
            toxicity_flag: false,
            permit_status: permit.status,
            expires_at: permit.expires_at,
            message: translate(lang, "listing.success", &[]),
            language: lang,
        })
    }
}
