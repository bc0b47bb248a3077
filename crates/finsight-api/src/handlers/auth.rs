//! Registration, login, token refresh, and the current-user endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use finsight_core::{CreateUser, User, UserRepository};

use crate::auth::{hash_password, require_active, verify_password, AuthUser, TokenResponse};
use crate::error::ApiError;
use crate::AppState;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Public view of a user account.
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            full_name: u.full_name,
            created_at: u.created_at,
        }
    }
}

/// `POST /auth/register`
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    let email = req.email.trim().to_lowercase();
    if !email.contains('@') || email.len() < 3 {
        return Err(ApiError::bad_request("invalid email address"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let hashed_password = hash_password(&req.password)?;
    // Duplicate email surfaces as a unique violation and maps to 409.
    let user = state
        .db
        .users
        .insert(CreateUser {
            email,
            hashed_password,
            full_name: req.full_name,
        })
        .await?;

    info!(user_id = %user.id, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// `POST /auth/login`
///
/// Unknown email and wrong password produce the same 401 body.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let email = req.email.trim().to_lowercase();
    let user = state
        .db
        .users
        .get_by_email(&email)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::unauthorized("invalid credentials"))?;

    if !verify_password(&req.password, &user.hashed_password) {
        return Err(ApiError::unauthorized("invalid credentials"));
    }

    let tokens = state.jwt.issue_pair(user.id, &user.email)?;
    info!(user_id = %user.id, "login succeeded");
    Ok(Json(tokens))
}

/// `POST /auth/refresh`
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let claims = state.jwt.verify(&req.refresh_token, "refresh")?;
    let user_id = claims
        .sub
        .parse::<Uuid>()
        .map_err(|_| ApiError::unauthorized("malformed token subject"))?;

    // The account may have been deactivated since the token was issued.
    let user = require_active(state.db.users.get(user_id).await?)?;

    Ok(Json(state.jwt.issue_pair(user.id, &user.email)?))
}

/// `GET /users/me`
pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<UserProfile>, ApiError> {
    let user = state
        .db
        .users
        .get(user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok(Json(user.into()))
}
