//! Session handlers: read, logout and access-token refresh.

use axum::{extract::State, Json};
use sqlx::PgPool;
use uuid::Uuid;

use crate::backend::auth::sessions::{self, Session};
use crate::backend::auth::users::get_user_by_id;
use crate::backend::error::ApiError;
use crate::backend::middleware::auth::AuthUser;
use crate::backend::server::state::AppState;

use super::types::{MessageResponse, RefreshRequest, RefreshResponse};

fn require_pool(pool: &Option<PgPool>) -> Result<&PgPool, ApiError> {
    pool.as_ref().ok_or(ApiError::ServiceUnavailable("database"))
}

/// Current session of the caller (GET /session).
pub async fn get_session(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Session>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    let session = sessions::find_valid_session(pool, user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("no valid session"))?;
    Ok(Json(session))
}

/// Invalidate every session of the caller (POST /logout).
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<MessageResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    let invalidated = sessions::invalidate_user_sessions(pool, user.user_id).await?;
    tracing::info!("logout: invalidated {} sessions for {}", invalidated, user.user_id);
    Ok(Json(MessageResponse::new("logged out successfully")))
}

/// Trade a refresh token for a fresh access token (POST /refresh-token).
///
/// The refresh token must verify, its session must still be valid and the
/// user must still exist; anything else is a 401.
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let claims = sessions::verify_refresh_token(&request.refresh_token)
        .map_err(|_| ApiError::unauthorized("invalid refresh token"))?;

    let session_id = Uuid::parse_str(&claims.session)
        .map_err(|_| ApiError::unauthorized("invalid refresh token"))?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| ApiError::unauthorized("invalid refresh token"))?;

    let pool = require_pool(&state.db_pool)?;

    let session = sessions::find_session(pool, session_id)
        .await?
        .filter(|s| s.valid && s.user_id == user_id)
        .ok_or_else(|| ApiError::unauthorized("session is no longer valid"))?;

    let user = get_user_by_id(pool, user_id)
        .await?
        .filter(|u| u.active)
        .ok_or_else(|| ApiError::unauthorized("session is no longer valid"))?;

    let access_token = sessions::create_access_token(&user, session.id)
        .map_err(|e| ApiError::Internal(format!("failed to create access token: {}", e)))?;

    Ok(Json(RefreshResponse {
        access_token,
        user: user.public(),
    }))
}
