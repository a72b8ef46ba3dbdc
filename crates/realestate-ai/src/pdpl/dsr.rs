use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::consent::{ConsentRecord, ConsentRepository};
use crate::auth::service::{is_valid_display_name, is_valid_email, is_valid_phone};
use crate::auth::{Rectification, Role, UserRecord, UserRepository, UserStoreError};

/// Account fields disclosed to a data-subject request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectView {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub restricted: bool,
}

impl From<&UserRecord> for SubjectView {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
            display_name: user.display_name.clone(),
            phone: user.phone.clone(),
            restricted: user.restricted,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectAccess {
    pub user: SubjectView,
    pub consent: Option<ConsentRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRef {
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RectifyRequest {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestrictRequest {
    pub user_id: String,
    #[serde(default = "default_restricted")]
    pub restricted: bool,
}

fn default_restricted() -> bool {
    true
}

#[derive(Debug, thiserror::Error)]
pub enum DsrError {
    #[error("invalid payload")]
    InvalidPayload,
    #[error("data subject not found")]
    NotFound,
    #[error("email already in use")]
    EmailInUse,
}

impl From<UserStoreError> for DsrError {
    fn from(value: UserStoreError) -> Self {
        match value {
            UserStoreError::EmailInUse | UserStoreError::Conflict => DsrError::EmailInUse,
            UserStoreError::NotFound => DsrError::NotFound,
        }
    }
}

/// Access, rectification, erasure and restriction over stored accounts.
pub struct DsrService {
    users: Arc<dyn UserRepository>,
    consent: Arc<dyn ConsentRepository>,
}

fn require_subject(user_id: &str) -> Result<&str, DsrError> {
    if user_id.is_empty() {
        Err(DsrError::InvalidPayload)
    } else {
        Ok(user_id)
    }
}

impl DsrService {
    pub fn new(users: Arc<dyn UserRepository>, consent: Arc<dyn ConsentRepository>) -> Self {
        Self { users, consent }
    }

    pub fn access(&self, request: SubjectRef) -> Result<SubjectAccess, DsrError> {
        let user_id = require_subject(&request.user_id)?;
        let user = self.users.get(user_id)?.ok_or(DsrError::NotFound)?;
        Ok(SubjectAccess {
            user: SubjectView::from(&user),
            consent: self.consent.get(user_id),
        })
    }

    pub fn rectify(&self, request: RectifyRequest) -> Result<SubjectView, DsrError> {
        let user_id = require_subject(&request.user_id)?;
        let changes = Rectification {
            email: request.email,
            display_name: request.display_name,
            phone: request.phone,
        };
        if changes.is_empty()
            || changes.email.as_deref().is_some_and(|email| !is_valid_email(email))
            || changes
                .display_name
                .as_deref()
                .is_some_and(|name| !is_valid_display_name(name))
            || changes.phone.as_deref().is_some_and(|phone| !is_valid_phone(phone))
        {
            return Err(DsrError::InvalidPayload);
        }

        let updated = self.users.rectify(user_id, changes)?;
        Ok(SubjectView::from(&updated))
    }

    pub fn erase(&self, request: SubjectRef) -> Result<SubjectView, DsrError> {
        let user_id = require_subject(&request.user_id)?;
        let anonymized = self.users.anonymize(user_id)?;
        Ok(SubjectView::from(&anonymized))
    }

    pub fn restrict(&self, request: RestrictRequest) -> Result<SubjectView, DsrError> {
        let user_id = require_subject(&request.user_id)?;
        let updated = self.users.set_restriction(user_id, request.restricted)?;
        Ok(SubjectView::from(&updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::InMemoryUserRepository;
    use crate::pdpl::InMemoryConsentLedger;
    use chrono::Utc;

    fn fixture() -> (DsrService, Arc<InMemoryUserRepository>) {
        let users = Arc::new(InMemoryUserRepository::new());
        for (id, email) in [("u-1", "one@example.com"), ("u-2", "two@example.com")] {
            users
                .insert(UserRecord::new(
                    id.to_string(),
                    email.to_string(),
                    "hash".to_string(),
                    Role::Buyer,
                ))
                .expect("insert");
        }
        let consent = Arc::new(InMemoryConsentLedger::new());
        consent.set("u-1", true, Utc::now());
        (DsrService::new(users.clone(), consent), users)
    }

    fn subject(id: &str) -> SubjectRef {
        SubjectRef {
            user_id: id.to_string(),
        }
    }

    #[test]
    fn access_includes_consent_when_recorded() {
        let (service, _) = fixture();
        let access = service.access(subject("u-1")).expect("access");
        assert_eq!(access.user.email, "one@example.com");
        assert!(access.consent.is_some_and(|record| record.consent));
        assert!(service.access(subject("u-2")).expect("access").consent.is_none());
        assert!(matches!(service.access(subject("nope")), Err(DsrError::NotFound)));
    }

    #[test]
    fn rectify_rejects_taken_email_and_empty_updates() {
        let (service, _) = fixture();
        let taken = service.rectify(RectifyRequest {
            user_id: "u-1".to_string(),
            email: Some("two@example.com".to_string()),
            display_name: None,
            phone: None,
        });
        assert!(matches!(taken, Err(DsrError::EmailInUse)));

        let empty = service.rectify(RectifyRequest {
            user_id: "u-1".to_string(),
            email: None,
            display_name: None,
            phone: None,
        });
        assert!(matches!(empty, Err(DsrError::InvalidPayload)));

        let renamed = service
            .rectify(RectifyRequest {
                user_id: "u-1".to_string(),
                email: None,
                display_name: Some("Layla".to_string()),
                phone: None,
            })
            .expect("rectified");
        assert_eq!(renamed.display_name.as_deref(), Some("Layla"));
    }

    #[test]
    fn erase_anonymizes_and_restricts() {
        let (service, users) = fixture();
        let erased = service.erase(subject("u-2")).expect("erased");
        assert_eq!(erased.email, "anonymized+u-2@example.invalid");
        assert!(erased.restricted);
        assert!(erased.display_name.is_none());
        assert!(users
            .find_by_email("two@example.com")
            .expect("lookup")
            .is_none());
    }

    #[test]
    fn restrict_defaults_to_true() {
        let (service, _) = fixture();
        let request: RestrictRequest =
            serde_json::from_str(r#"{"userId":"u-1"}"#).expect("payload");
        assert!(service.restrict(request).expect("restricted").restricted);
    }
}
