use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use pledge_types::api::Claims;

use crate::auth::{AppState, decode_token};
use crate::error::ApiError;

/// The caller of a protected request, resolved once from the session token
/// and handed to handlers through request extensions.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            name: claims.name,
            expires_at: DateTime::from_timestamp(claims.exp as i64, 0).unwrap_or_default(),
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
}

/// Extract and validate the session JWT from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers()).ok_or(ApiError::Unauthenticated)?;

    let claims =
        decode_token(&state.config.jwt_secret, token).map_err(|_| ApiError::Unauthenticated)?;

    req.extensions_mut().insert(Identity::from(claims));
    Ok(next.run(req).await)
}
