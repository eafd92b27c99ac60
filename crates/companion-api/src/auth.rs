use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Extension, Json, extract::{State, rejection::JsonRejection}, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use companion_core::opener::OpeningRotation;
use companion_db::Database;
use companion_types::api::{Claims, LoginRequest, LoginResponse, ProfileResponse, RegisterRequest, RegisterResponse};
use companion_types::models::{DenialStatus, MemoryPolicy};

use crate::error::ApiError;
use crate::{blocking, convert};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub settings: Settings,
    pub openers: OpeningRotation,
}

/// Product knobs that differ between deployments.
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    /// Trigger rule applied to messages sent through `/chat`.
    pub chat_memory_policy: MemoryPolicy,
    pub deny_messages: DenialStatus,
    pub deny_memories: DenialStatus,
    pub deny_conversations: DenialStatus,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chat_memory_policy: MemoryPolicy::Heuristic,
            deny_messages: DenialStatus::NotFound,
            deny_memories: DenialStatus::NotFound,
            deny_conversations: DenialStatus::NotFound,
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let name = req.name.trim().to_string();
    let email = req.email.trim().to_lowercase();

    // Validate input
    if name.is_empty() {
        return Err(ApiError::validation("Name is required"));
    }
    if !email.contains('@') {
        return Err(ApiError::validation("Invalid email address"));
    }
    if req.password.len() < 6 {
        return Err(ApiError::validation("Password must be at least 6 characters"));
    }

    let user = blocking(move || {
        if state.db.get_user_by_email(&email)?.is_some() {
            return Err(ApiError::Conflict("User with this email already exists".into()));
        }
        let password_hash = hash_password(&req.password)?;
        let user = state
            .db
            .register_user(&name, &email, &password_hash, chrono::Utc::now())?;
        let user_id: Uuid = user.id.parse().map_err(anyhow::Error::from)?;
        let token = create_token(&state.jwt_secret, user_id, &user.email)?;
        Ok(RegisterResponse { user_id, token })
    })
    .await?;
    info!(user_id = %user.user_id, "user registered");

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;

    let response = blocking(move || {
        let user = state
            .db
            .get_user_by_email(&req.email.trim().to_lowercase())?
            .ok_or(ApiError::Unauthorized)?;

        if !verify_password(&req.password, &user.password)? {
            return Err(ApiError::Unauthorized);
        }

        let user_id: Uuid = user.id.parse().map_err(anyhow::Error::from)?;
        let token = create_token(&state.jwt_secret, user_id, &user.email)?;
        Ok(LoginResponse {
            user_id,
            name: user.name,
            token,
        })
    })
    .await?;

    Ok(Json(response))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = blocking(move || {
        let user_id = claims.sub.to_string();
        let user = state
            .db
            .get_user_by_id(&user_id)?
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        let subscription = state.db.get_subscription(&user_id)?.map(convert::subscription);

        Ok(ProfileResponse {
            created_at: companion_db::decode_timestamp(&user.created_at)?,
            id: user.id,
            name: user.name,
            email: user.email,
            subscription,
        })
    })
    .await?;

    Ok(Json(profile))
}

/// Argon2id PHC string for `password` with a fresh random salt.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

/// `Ok(false)` on a wrong password; `Err` only if `stored` is not a PHC string.
pub fn verify_password(password: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed_hash =
        PasswordHash::new(stored).map_err(|e| anyhow::anyhow!("stored hash is unreadable: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn create_token(secret: &str, user_id: Uuid, email: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
