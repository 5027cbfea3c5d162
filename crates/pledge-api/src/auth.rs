use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{info, warn};
use uuid::Uuid;

use pledge_db::Database;
use pledge_types::api::{Claims, CredentialsSignInRequest, SessionResponse, SignInResponse};
use pledge_types::models::User;

use crate::config::Config;
use crate::error::{ApiError, ApiResult, run_blocking};
use crate::middleware::Identity;

const SESSION_TTL_DAYS: i64 = 30;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub config: Config,
}

/// Provider sign-in hook: create the user on first sign-in, refresh the
/// profile on later ones. Email is the identity key.
pub fn upsert_identity(
    db: &Database,
    email: &str,
    name: Option<&str>,
    image: Option<&str>,
    now: DateTime<Utc>,
) -> ApiResult<User> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ApiError::Validation("Email is required to sign in".to_string()));
    }

    let row = db.upsert_user(&Uuid::new_v4().to_string(), email, name, image, &now)?;
    Ok(User::try_from(row)?)
}

/// POST /api/auth/callback/credentials
pub async fn sign_in_with_credentials(
    State(state): State<AppState>,
    req: Result<Json<CredentialsSignInRequest>, JsonRejection>,
) -> ApiResult<Json<SignInResponse>> {
    let Json(req) = req?;

    let Some(account) = state.config.credentials.as_ref() else {
        warn!("Credentials sign-in attempted but no credentials user is configured");
        return Err(ApiError::InvalidCredentials);
    };

    if !account.email.eq_ignore_ascii_case(req.email.trim()) {
        return Err(ApiError::InvalidCredentials);
    }

    let parsed_hash = PasswordHash::new(&account.password_hash)
        .map_err(|e| anyhow::anyhow!("Configured credentials hash is invalid: {}", e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::InvalidCredentials)?;

    let db = state.clone();
    let email = account.email.clone();
    let name = account.name.clone();
    let user = run_blocking(move || {
        upsert_identity(&db.db, &email, name.as_deref(), None, Utc::now())
    })
    .await?;

    let (token, _) = create_token(&state.config.jwt_secret, &user, Utc::now())?;
    info!("User {} signed in with credentials", user.email);

    Ok(Json(SignInResponse { user, token }))
}

/// GET /api/auth/session
pub async fn session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<SessionResponse>> {
    let db = state.clone();
    let uid = identity.user_id.to_string();
    let row = run_blocking(move || Ok(db.db.get_user_by_id(&uid)?))
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    Ok(Json(SessionResponse {
        user: User::try_from(row)?,
        expires: identity.expires_at,
    }))
}

pub fn create_token(
    secret: &str,
    user: &User,
    now: DateTime<Utc>,
) -> anyhow::Result<(String, DateTime<Utc>)> {
    let expires = now + Duration::days(SESSION_TTL_DAYS);
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        name: user.name.clone(),
        exp: expires.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok((token, expires))
}

pub fn decode_token(secret: &str, token: &str) -> anyhow::Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}
