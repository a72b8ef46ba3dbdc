use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const PERMIT_VALIDITY_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermitStatus {
    Valid,
    Invalid,
    Expired,
}

impl PermitStatus {
    pub fn label(self) -> &'static str {
        match self {
            PermitStatus::Valid => "valid",
            PermitStatus::Invalid => "invalid",
            PermitStatus::Expired => "expired",
        }
    }

    /// Catalog key for the localized status message.
    pub fn message_key(self) -> &'static str {
        match self {
            PermitStatus::Valid => "permits.valid",
            PermitStatus::Invalid => "permits.invalid",
            PermitStatus::Expired => "permits.expired",
        }
    }
}

/// Verification outcome; `expires_at` is epoch milliseconds, zero when invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitRecord {
    pub status: PermitStatus,
    pub expires_at: i64,
}

impl PermitRecord {
    pub fn invalid() -> Self {
        Self {
            status: PermitStatus::Invalid,
            expires_at: 0,
        }
    }

    pub fn valid_until(expires_at: DateTime<Utc>) -> Self {
        Self {
            status: PermitStatus::Valid,
            expires_at: expires_at.timestamp_millis(),
        }
    }

    /// Eight digits, not ending in zero, is what the registry issues.
    pub fn compute(trakheesi: &str, now: DateTime<Utc>) -> Self {
        if is_well_formed(trakheesi) {
            Self::valid_until(now + Duration::days(PERMIT_VALIDITY_DAYS))
        } else {
            Self::invalid()
        }
    }

    /// Valid records past their expiry degrade to expired.
    pub fn aged(self, now: DateTime<Utc>) -> Self {
        if self.status == PermitStatus::Valid && self.expires_at <= now.timestamp_millis() {
            Self {
                status: PermitStatus::Expired,
                expires_at: self.expires_at,
            }
        } else {
            self
        }
    }
}

pub fn is_well_formed(trakheesi: &str) -> bool {
    let trimmed = trakheesi.trim();
    trimmed.len() == 8
        && trimmed.bytes().all(|byte| byte.is_ascii_digit())
        && !trimmed.ends_with('0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_requires_eight_digits_not_ending_in_zero() {
        assert!(is_well_formed("12345678"));
        assert!(is_well_formed(" 12345678 "));
        assert!(!is_well_formed("12345670"));
        assert!(!is_well_formed("1234567"));
        assert!(!is_well_formed("123456789"));
        assert!(!is_well_formed("1234567a"));
        assert!(!is_well_formed("١٢٣٤٥٦٧٨"));
    }

    #[test]
    fn compute_expires_seven_days_out() {
        let now = Utc::now();
        let record = PermitRecord::compute("87654321", now);
        assert_eq!(record.status, PermitStatus::Valid);
        assert_eq!(
            record.expires_at,
            (now + Duration::days(7)).timestamp_millis()
        );
        assert_eq!(PermitRecord::compute("87654320", now), PermitRecord::invalid());
    }

    #[test]
    fn aged_only_touches_valid_records() {
        let now = Utc::now();
        let stale = PermitRecord {
            status: PermitStatus::Valid,
            expires_at: now.timestamp_millis(),
        };
        assert_eq!(stale.aged(now).status, PermitStatus::Expired);
        assert_eq!(PermitRecord::invalid().aged(now), PermitRecord::invalid());
    }
}
