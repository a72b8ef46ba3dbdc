use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marketplace roles carried in tokens and user records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Agent,
    Admin,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Agent => "agent",
            Role::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "buyer" => Some(Role::Buyer),
            "agent" => Some(Role::Agent),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub roles: Vec<Role>,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub restricted: bool,
    pub stripe_account_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn new(id: String, email: String, password_hash: String, role: Role) -> Self {
        Self {
            id,
            email,
            password_hash,
            role,
            roles: vec![role],
            display_name: None,
            phone: None,
            restricted: false,
            stripe_account_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            email: self.email.clone(),
            role: self.role,
            roles: self.roles.clone(),
        }
    }

    pub fn account_view(&self) -> AccountView {
        AccountView {
            id: self.id.clone(),
            email: self.email.clone(),
            role: self.role,
            roles: self.roles.clone(),
            display_name: self.display_name.clone(),
            phone: self.phone.clone(),
        }
    }

    pub fn profile_view(&self) -> ProfileView {
        ProfileView {
            id: self.id.clone(),
            email: self.email.clone(),
            role: self.role,
            display_name: self.display_name.clone(),
            phone: self.phone.clone(),
        }
    }
}

/// Token payload. `roles` mirrors `role` plus any grants added later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub roles: Vec<Role>,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn has_role(&self, role: Role) -> bool {
        self.role == role || self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}

/// Body returned next to a freshly issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub roles: Vec<Role>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub roles: Vec<Role>,
    pub display_name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub display_name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Fields a data-subject rectification may overwrite.
#[derive(Debug, Clone, Default)]
pub struct Rectification {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub phone: Option<String>,
}

impl Rectification {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.display_name.is_none() && self.phone.is_none()
    }
}
