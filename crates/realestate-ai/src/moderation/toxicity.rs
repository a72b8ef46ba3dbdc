const TOXIC_TERMS: &[&str] = &["scam", "fraud", "hate", "kill"];

/// 1.0 when any flagged term appears (case-insensitive substring), else 0.0.
pub fn score_text(text: &str) -> f64 {
    let lower = text.to_lowercase();
    if TOXIC_TERMS.iter().any(|term| lower.contains(term)) {
        1.0
    } else {
        0.0
    }
}
