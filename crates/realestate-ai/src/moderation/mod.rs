//! Keyword toxicity scoring and PII detection for listing copy.

pub mod middleware;
pub mod pii;
pub mod service;
pub mod toxicity;

pub use middleware::{collect_candidate_text, moderate_listing_content};
pub use pii::{detect_pii, PiiMatches};
pub use service::{ModerationResult, ModerationService, REASON_PII, REASON_TOXICITY};
pub use toxicity::score_text;
