use serde::Serialize;

use super::pii::{detect_pii, PiiMatches};
use super::toxicity::score_text;
use crate::config::ModerationConfig;

pub const REASON_TOXICITY: &str = "toxicity_threshold_exceeded";
pub const REASON_PII: &str = "pii_detected";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModerationResult {
    pub enabled: bool,
    pub flagged: bool,
    pub score: f64,
    pub threshold: f64,
    pub reasons: Vec<&'static str>,
    pub pii: PiiMatches,
}

#[derive(Debug, Clone)]
pub struct ModerationService {
    config: ModerationConfig,
}

impl ModerationService {
    pub fn new(config: ModerationConfig) -> Self {
        Self { config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Scores `text` against the configured threshold unless a positive,
    /// finite `threshold_override` is supplied.
    pub fn moderate(&self, text: &str, threshold_override: Option<f64>) -> ModerationResult {
        let threshold = threshold_override
            .filter(|value| value.is_finite() && *value > 0.0)
            .unwrap_or(self.config.threshold);

        let blank = text.trim().is_empty();
        let score = if blank { 0.0 } else { score_text(text) };
        let pii = if blank {
            PiiMatches::default()
        } else {
            detect_pii(text)
        };

        if !self.config.enabled {
            return ModerationResult {
                enabled: false,
                flagged: false,
                score,
                threshold,
                reasons: Vec::new(),
                pii,
            };
        }

        let mut reasons = Vec::new();
        if score >= threshold {
            reasons.push(REASON_TOXICITY);
        }
        if !pii.is_empty() {
            reasons.push(REASON_PII);
        }

        ModerationResult {
            enabled: true,
            flagged: !reasons.is_empty(),
            score,
            threshold,
            reasons,
            pii,
        }
    }
}
