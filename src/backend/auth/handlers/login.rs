//! Login handler (POST /login).
//!
//! Unknown emails, wrong passwords and deactivated accounts all answer the
//! same 401, so the endpoint leaks nothing about which accounts exist.

use axum::{extract::State, Json};
use bcrypt::verify;
use sqlx::PgPool;

use crate::backend::auth::sessions;
use crate::backend::auth::users::get_user_by_email;
use crate::backend::error::ApiError;
use crate::backend::server::state::AppState;

use super::types::{AuthResponse, LoginRequest};

/// Authenticate and hand out an access/refresh token pair.
///
/// A still-valid session is reused; otherwise a new one is created.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let pool: &PgPool = state
        .db_pool
        .as_ref()
        .ok_or(ApiError::ServiceUnavailable("database"))?;

    let email = request.email.trim().to_lowercase();
    tracing::info!("login request for {}", email);

    let user = get_user_by_email(pool, &email)
        .await?
        .filter(|u| u.active)
        .ok_or_else(|| {
            tracing::warn!("login rejected for {}", email);
            ApiError::unauthorized("invalid credentials")
        })?;

    let password_ok = verify(&request.password, &user.password_hash)
        .map_err(|e| ApiError::Internal(format!("password verification failed: {}", e)))?;
    if !password_ok {
        tracing::warn!("invalid password for {}", email);
        return Err(ApiError::unauthorized("invalid credentials"));
    }

    let session = match sessions::find_valid_session(pool, user.id).await? {
        Some(session) => session,
        None => sessions::create_session(pool, user.id).await?,
    };

    let access_token = sessions::create_access_token(&user, session.id)
        .map_err(|e| ApiError::Internal(format!("failed to create access token: {}", e)))?;
    let refresh_token = sessions::create_refresh_token(user.id, session.id)
        .map_err(|e| ApiError::Internal(format!("failed to create refresh token: {}", e)))?;

    tracing::info!("user logged in: {} ({})", user.name, user.email);

    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: user.public(),
    }))
}
