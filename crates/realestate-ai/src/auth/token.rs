use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use super::domain::{Claims, UserRecord};

/// Signs and verifies HS256 session tokens.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token rejected: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("token is missing the {0} claim")]
    MissingClaim(&'static str),
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user: &UserRecord, now: DateTime<Utc>) -> Result<String, TokenError> {
        let iat = now.timestamp();
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
            roles: user.roles.clone(),
            iat,
            exp: iat + self.ttl.as_secs() as i64,
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        let claims = data.claims;

        if claims.sub.trim().is_empty() {
            return Err(TokenError::MissingClaim("sub"));
        }
        if claims.email.trim().is_empty() {
            return Err(TokenError::MissingClaim("email"));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::domain::Role;

    fn user() -> UserRecord {
        UserRecord::new(
            "u-1".to_string(),
            "agent@example.com".to_string(),
            "hash".to_string(),
            Role::Agent,
        )
    }

    #[test]
    fn issued_token_round_trips_claims() {
        let tokens = TokenService::new("secret", Duration::from_secs(3600));
        let token = tokens.issue(&user(), Utc::now()).expect("token issued");
        let claims = tokens.verify(&token).expect("token verifies");
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.role, Role::Agent);
        assert_eq!(claims.roles, vec![Role::Agent]);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn rejects_foreign_signature() {
        let issuer = TokenService::new("one", Duration::from_secs(60));
        let verifier = TokenService::new("two", Duration::from_secs(60));
        let token = issuer.issue(&user(), Utc::now()).expect("token issued");
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let tokens = TokenService::new("secret", Duration::from_secs(60));
        let an_hour_ago = Utc::now() - chrono::Duration::hours(1);
        let token = tokens.issue(&user(), an_hour_ago).expect("token issued");
        assert!(matches!(tokens.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn rejects_tampered_payload() {
        let tokens = TokenService::new("secret", Duration::from_secs(60));
        let token = tokens.issue(&user(), Utc::now()).expect("token issued");
        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        parts[1].push('x');
        assert!(tokens.verify(&parts.join(".")).is_err());
    }
}
