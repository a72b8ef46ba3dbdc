use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use super::domain::{
    AccountView, AuthSession, Claims, Credentials, ProfilePatch, ProfileView, Registration, Role,
    UserRecord,
};
use super::store::{UserRepository, UserStoreError};
use super::token::{TokenError, TokenService};
use crate::config::AuthConfig;
use crate::marketing::{welcome_name, WelcomeMailer};

pub const DEFAULT_AGENT_EMAIL: &str = "agent@example.com";
const DEFAULT_AGENT_PASSWORD: &str = "secret12";
const MIN_PASSWORD_LEN: usize = 8;
const MAX_DISPLAY_NAME_LEN: usize = 120;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static regex"))
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\d+().\- ]{6,20}$").expect("static regex"))
}

pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email)
}

pub fn is_valid_phone(phone: &str) -> bool {
    phone_pattern().is_match(phone)
}

pub fn is_valid_display_name(name: &str) -> bool {
    let len = name.chars().count();
    (1..=MAX_DISPLAY_NAME_LEN).contains(&len)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Registration, login and profile flows over a [`UserRepository`].
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    tokens: Arc<TokenService>,
    mailer: Arc<dyn WelcomeMailer>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<TokenService>,
        mailer: Arc<dyn WelcomeMailer>,
        config: AuthConfig,
    ) -> Self {
        Self {
            users,
            tokens,
            mailer,
            config,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    pub fn secure_cookies(&self) -> bool {
        self.config.secure_cookies
    }

    /// Seeds the demo agent account unless an account with its email exists.
    pub fn seed_default_agent(&self) -> Result<(), AuthError> {
        if self.users.find_by_email(DEFAULT_AGENT_EMAIL)?.is_some() {
            return Ok(());
        }
        let hash = bcrypt::hash(DEFAULT_AGENT_PASSWORD, self.config.bcrypt_cost)?;
        let mut agent = UserRecord::new(
            Uuid::new_v4().to_string(),
            DEFAULT_AGENT_EMAIL.to_string(),
            hash,
            Role::Agent,
        );
        agent.display_name = Some("Dubai Agent".to_string());
        self.users.insert(agent)?;
        Ok(())
    }

    pub async fn register(&self, registration: Registration) -> Result<AuthSession, AuthError> {
        let raw_email = registration.email.trim().to_string();
        if !is_valid_email(&raw_email) || registration.password.chars().count() < MIN_PASSWORD_LEN
        {
            return Err(AuthError::InvalidPayload);
        }

        // Only agent can be requested; anything else, admin included, is a buyer.
        let role = match registration.role.as_deref().and_then(Role::parse) {
            Some(Role::Agent) => Role::Agent,
            _ => Role::Buyer,
        };

        let email = normalize_email(&raw_email);
        if self.users.find_by_email(&email)?.is_some() {
            return Err(AuthError::AccountExists);
        }

        let hash = bcrypt::hash(&registration.password, self.config.bcrypt_cost)?;
        let record = UserRecord::new(Uuid::new_v4().to_string(), email.clone(), hash, role);
        let mut user = self.users.insert(record).map_err(|err| match err {
            UserStoreError::Conflict => AuthError::AccountExists,
            other => AuthError::Store(other),
        })?;

        if self.config.default_admin_email.as_deref() == Some(email.as_str()) {
            user = self.users.assign_role(&user.id, Role::Admin)?;
        }

        let mailer = Arc::clone(&self.mailer);
        let name = welcome_name(&raw_email).to_string();
        let recipient = email.clone();
        tokio::spawn(async move {
            if let Err(err) = mailer.send_welcome(&recipient, &name).await {
                warn!(error = %err, recipient = %recipient, "marketing.welcome_failed");
            }
        });

        info!(user_id = %user.id, role = user.role.label(), "auth.register");
        self.session_for(&user)
    }

    pub fn login(&self, credentials: Credentials) -> Result<AuthSession, AuthError> {
        let email = normalize_email(&credentials.email);
        if !is_valid_email(&email) || credentials.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::InvalidPayload);
        }

        let user = self
            .users
            .find_by_email(&email)?
            .ok_or(AuthError::Unauthorized)?;

        if !bcrypt::verify(&credentials.password, &user.password_hash)? {
            return Err(AuthError::Unauthorized);
        }

        self.session_for(&user)
    }

    pub fn me(&self, claims: &Claims) -> Result<AccountView, AuthError> {
        Ok(self.current(claims)?.account_view())
    }

    pub fn profile(&self, claims: &Claims) -> Result<ProfileView, AuthError> {
        Ok(self.current(claims)?.profile_view())
    }

    pub fn update_profile(
        &self,
        claims: &Claims,
        patch: ProfilePatch,
    ) -> Result<ProfileView, AuthError> {
        if patch.display_name.is_none() && patch.phone.is_none() {
            return Err(AuthError::InvalidPayload);
        }
        if patch
            .display_name
            .as_deref()
            .is_some_and(|name| !is_valid_display_name(name))
        {
            return Err(AuthError::InvalidPayload);
        }
        if patch.phone.as_deref().is_some_and(|phone| !is_valid_phone(phone)) {
            return Err(AuthError::InvalidPayload);
        }

        let updated = self
            .users
            .update_profile(&claims.sub, patch.display_name, patch.phone)
            .map_err(|err| match err {
                UserStoreError::NotFound => AuthError::NotFound,
                other => AuthError::Store(other),
            })?;
        Ok(updated.profile_view())
    }

    fn current(&self, claims: &Claims) -> Result<UserRecord, AuthError> {
        self.users.get(&claims.sub)?.ok_or(AuthError::NotFound)
    }

    fn session_for(&self, user: &UserRecord) -> Result<AuthSession, AuthError> {
        let token = self.tokens.issue(user, Utc::now())?;
        Ok(AuthSession {
            token,
            user: user.summary(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid payload")]
    InvalidPayload,
    #[error("account already exists")]
    AccountExists,
    #[error("invalid credentials")]
    Unauthorized,
    #[error("user not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] UserStoreError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}
