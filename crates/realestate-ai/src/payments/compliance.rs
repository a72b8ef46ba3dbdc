use std::sync::OnceLock;

use regex::Regex;
use serde_json::json;
use tracing::warn;

use super::domain::{AmlReason, AmlResult};
use crate::audit::{AuditEvent, AuditLogger};

pub const AML_ROUTE_LABEL: &str = "payments/compliance";
pub const AML_METHOD: &str = "AML_CHECK";
pub const AML_ACTION: &str = "AML_EVALUATION";

fn offshore_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)offshore").expect("static regex"))
}

/// Amount over the limit takes precedence over the offshore marker.
pub fn aml_check(amount_aed: f64, user_id: &str, limit_aed: f64) -> AmlResult {
    if amount_aed > limit_aed {
        return AmlResult::flagged(AmlReason::AmountOverLimit);
    }
    if offshore_pattern().is_match(user_id) {
        return AmlResult::flagged(AmlReason::OffshoreUser);
    }
    AmlResult::clear()
}

/// Writes the evaluation to the audit trail; 423 marks a flagged transfer.
pub async fn log_compliance(
    audit: &AuditLogger,
    result: &AmlResult,
    amount_aed: f64,
    user_id: &str,
) {
    let event = AuditEvent {
        route: AML_ROUTE_LABEL.to_string(),
        method: AML_METHOD.to_string(),
        status: if result.flag { 423 } else { 200 },
        body: Some(json!({ "amount_aed": amount_aed, "user_id": user_id })),
        result: serde_json::to_value(result).ok(),
        user_id: Some(user_id.to_string()),
        action: Some(AML_ACTION.to_string()),
    };
    if let Err(err) = audit.log(event).await {
        warn!(error = %err, user_id, "payments.compliance_log_failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_limit_is_exclusive() {
        assert_eq!(aml_check(1_000_000.0, "u-1", 1_000_000.0), AmlResult::clear());
        assert_eq!(
            aml_check(1_000_000.01, "u-1", 1_000_000.0),
            AmlResult::flagged(AmlReason::AmountOverLimit)
        );
    }

    #[test]
    fn offshore_users_are_flagged_after_amount() {
        assert_eq!(
            aml_check(10.0, "OffShore-Holdings", 1_000_000.0),
            AmlResult::flagged(AmlReason::OffshoreUser)
        );
        assert_eq!(
            aml_check(2_000_000.0, "offshore", 1_000_000.0).reason,
            Some(AmlReason::AmountOverLimit)
        );
    }

    #[tokio::test]
    async fn flagged_evaluation_is_logged_with_423() {
        let dir = tempfile::tempdir().expect("tempdir");
        let logger = AuditLogger::new(dir.path().join("audit.log"));
        let result = aml_check(5.0, "offshore-1", 1_000_000.0);
        log_compliance(&logger, &result, 5.0, "offshore-1").await;

        let contents = std::fs::read_to_string(logger.path()).expect("log written");
        let record: serde_json::Value =
            serde_json::from_str(contents.trim()).expect("json line");
        assert_eq!(record["status"], 423);
        assert_eq!(record["method"], AML_METHOD);
        assert_eq!(record["action"], AML_ACTION);
        assert_eq!(record["result"]["reason"], "offshore_user");
        assert_eq!(record["userId"], "offshore-1");
    }
}
