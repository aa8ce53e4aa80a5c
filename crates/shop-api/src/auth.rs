//! # Sessions and Passwords
//!
//! Argon2 password hashes and HS256 session tokens, plus the
//! `AuthUser` / `AdminUser` extractors guarding user and back-office routes.

use crate::error::ApiError;
use crate::state::AppState;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use shop_core::{Role, ShopError, ShopResult, User, UserId};
use tracing::debug;

/// Hash a password into a PHC string
pub fn hash_password(password: &str) -> ShopResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ShopError::Internal(format!("password hashing failed: {e}")))
}

/// Check a password against a stored PHC string
pub fn verify_password(password: &str, stored_hash: &str) -> ShopResult<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| ShopError::Internal(format!("malformed password hash: {e}")))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(ShopError::Internal(format!(
            "password verification failed: {e}"
        ))),
    }
}

/// Session token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub email: String,
    pub role: Role,
    /// Expiry, seconds since the epoch
    pub exp: i64,
}

/// Signing and verification keys for session tokens
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Issue a token for `user`
    pub fn issue(&self, user: &User) -> ShopResult<String> {
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            exp: (Utc::now() + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ShopError::Internal(format!("failed to sign session token: {e}")))
    }

    /// Decode and validate a token (signature and expiry)
    pub fn verify(&self, token: &str) -> ShopResult<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Rejected session token: {}", e);
                ShopError::Unauthorized("Invalid or expired token".to_string())
            })
    }
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    pub role: Role,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ShopError::Unauthorized("Access token required".to_string()))?;

        let claims = state.sessions.verify(token)?;
        let id = claims
            .sub
            .parse()
            .map_err(|_| ShopError::Unauthorized("Invalid or expired token".to_string()))?;

        Ok(AuthUser {
            id,
            email: claims.email,
            role: claims.role,
        })
    }
}

/// Authenticated caller with the `admin` role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminUser(pub AuthUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            return Err(ShopError::Forbidden("Admin access required".to_string()).into());
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        User {
            id: 42,
            name: "Ayu".to_string(),
            email: "ayu@example.com".to_string(),
            password_hash: String::new(),
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        assert!(verify_password("hunter22", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_session_token_carries_identity() {
        let keys = SessionKeys::new("test-secret", 1);
        let token = keys.issue(&user(Role::Admin)).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.email, "ayu@example.com");
        assert_eq!(claims.role, Role::Admin);
    }

    #[test]
    fn test_foreign_token_rejected() {
        let token = SessionKeys::new("other-secret", 1)
            .issue(&user(Role::Customer))
            .unwrap();
        let result = SessionKeys::new("test-secret", 1).verify(&token);
        assert!(matches!(result, Err(ShopError::Unauthorized(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        // well past the default 60s leeway
        let keys = SessionKeys::new("test-secret", -1);
        let token = keys.issue(&user(Role::Customer)).unwrap();
        assert!(keys.verify(&token).is_err());
    }
}
