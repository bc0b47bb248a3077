//! Password hashing and JWT issuance/validation.
//!
//! HS256 tokens: short-lived access tokens carry the email and are accepted
//! by the `AuthUser` extractor; long-lived refresh tokens can only be
//! exchanged for a new pair at `/auth/refresh`.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use finsight_core::defaults::{ACCESS_TOKEN_EXPIRE_MINUTES, REFRESH_TOKEN_EXPIRE_DAYS};
use finsight_core::{Error, Result, User, UserRepository};

use crate::error::ApiError;
use crate::AppState;

/// Hash a password with Argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| Error::Internal(format!("password hashing failed: {e}")))
}

/// Constant-time password verification. `false` covers both a wrong
/// password and an unparseable stored hash.
pub fn verify_password(password: &str, hashed: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hashed) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// JWT claims shared by access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub email: String,
    /// "access" or "refresh".
    pub token_type: String,
    pub exp: i64,
    pub iat: i64,
}

/// Token pair returned by login and refresh.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// HS256 signing/verification keys plus expiry policy.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_expire_minutes: i64,
    refresh_expire_days: i64,
}

impl JwtKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_expire_minutes: ACCESS_TOKEN_EXPIRE_MINUTES,
            refresh_expire_days: REFRESH_TOKEN_EXPIRE_DAYS,
        }
    }

    /// Read `SECRET_KEY` (required) and optional expiry overrides.
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var("SECRET_KEY")
            .map_err(|_| Error::Config("SECRET_KEY must be set".into()))?;
        if secret.len() < 32 {
            return Err(Error::Config(
                "SECRET_KEY must be at least 32 characters".into(),
            ));
        }
        let mut keys = Self::new(&secret);
        if let Some(minutes) = env_i64("ACCESS_TOKEN_EXPIRE_MINUTES") {
            keys.access_expire_minutes = minutes;
        }
        if let Some(days) = env_i64("REFRESH_TOKEN_EXPIRE_DAYS") {
            keys.refresh_expire_days = days;
        }
        Ok(keys)
    }

    fn issue(&self, user_id: Uuid, email: &str, token_type: &str, lifetime: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            token_type: token_type.to_string(),
            exp: (now + lifetime).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("token encoding failed: {e}")))
    }

    /// Issue an access + refresh token pair.
    pub fn issue_pair(&self, user_id: Uuid, email: &str) -> Result<TokenResponse> {
        let access_token = self.issue(
            user_id,
            email,
            "access",
            Duration::minutes(self.access_expire_minutes),
        )?;
        let refresh_token = self.issue(
            user_id,
            email,
            "refresh",
            Duration::days(self.refresh_expire_days),
        )?;
        Ok(TokenResponse {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in: self.access_expire_minutes * 60,
        })
    }

    /// Validate a token of the expected type and return its claims.
    pub fn verify(&self, token: &str, expected_type: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|e| Error::Unauthorized(format!("invalid token: {e}")))?;
        if data.claims.token_type != expected_type {
            return Err(Error::Unauthorized(format!(
                "expected {expected_type} token"
            )));
        }
        Ok(data.claims)
    }
}

fn env_i64(name: &str) -> Option<i64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Resolve a looked-up account, rejecting missing and deactivated users
/// with the same 401.
pub fn require_active(user: Option<User>) -> std::result::Result<User, ApiError> {
    user.filter(|u| u.is_active)
        .ok_or_else(|| ApiError::unauthorized("account no longer active"))
}

/// Authenticated caller, extracted from the `Authorization: Bearer` header.
/// A valid token is not enough: the account must still exist and be active.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
}

#[async_trait::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("missing Authorization header"))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("expected Bearer token"))?;

        let claims = state.jwt.verify(token, "access").map_err(ApiError::from)?;
        let user_id = claims
            .sub
            .parse::<Uuid>()
            .map_err(|_| ApiError::unauthorized("malformed token subject"))?;

        // The account may have been deactivated since the token was issued.
        let user = require_active(state.db.users.get(user_id).await.map_err(ApiError::from)?)?;

        Ok(AuthUser {
            user_id: user.id,
            email: user.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> JwtKeys {
        JwtKeys::new("a-test-secret-that-is-long-enough!!")
    }

    #[test]
    fn test_hash_and_verify_round_trip() {
        let hash = hash_password("hunter2hunter2").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2hunter2", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn test_salted_hashes_differ() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_access_token_round_trip() {
        let keys = keys();
        let user_id = Uuid::new_v4();
        let pair = keys.issue_pair(user_id, "a@example.com").unwrap();
        assert_eq!(pair.token_type, "bearer");

        let claims = keys.verify(&pair.access_token, "access").unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email, "a@example.com");
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let keys = keys();
        let pair = keys.issue_pair(Uuid::new_v4(), "a@example.com").unwrap();
        assert!(keys.verify(&pair.refresh_token, "access").is_err());
        assert!(keys.verify(&pair.refresh_token, "refresh").is_ok());
    }

    #[test]
    fn test_tokens_from_other_secret_are_rejected() {
        let pair = keys().issue_pair(Uuid::new_v4(), "a@example.com").unwrap();
        let other = JwtKeys::new("a-different-secret-also-long-enough");
        assert!(other.verify(&pair.access_token, "access").is_err());
    }

    fn account(is_active: bool) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "a@example.com".into(),
            hashed_password: "hash".into(),
            full_name: None,
            is_active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_require_active_accepts_active_account() {
        let user = account(true);
        let id = user.id;
        assert_eq!(require_active(Some(user)).unwrap().id, id);
    }

    #[test]
    fn test_require_active_rejects_deactivated_account() {
        let err = require_active(Some(account(false))).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_require_active_rejects_missing_account() {
        let err = require_active(None).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::UNAUTHORIZED);
    }
}
