//! OTP password reset (POST /forgot-password, POST /reset-password).

use axum::{extract::State, Json};
use sqlx::PgPool;

use crate::backend::auth::{otp, sessions, users};
use crate::backend::error::ApiError;
use crate::backend::server::state::AppState;

use super::types::{ForgotPasswordRequest, MessageResponse, ResetPasswordRequest};

const GENERIC_RESPONSE: &str = "if the account exists, a reset code has been sent";

/// Issue a reset OTP and mail it.
///
/// Always answers the same generic message so the endpoint cannot be used
/// to enumerate accounts.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let pool: &PgPool = state
        .db_pool
        .as_ref()
        .ok_or(ApiError::ServiceUnavailable("database"))?;

    let email = request.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(ApiError::bad_request("email is required"));
    }

    if let Some(user) = users::get_user_by_email(pool, &email).await?.filter(|u| u.active) {
        let code = otp::generate_otp();
        let code_hash = otp::hash_otp(&code)
            .map_err(|e| ApiError::Internal(format!("failed to hash otp: {}", e)))?;
        users::set_reset_otp(pool, user.id, &code_hash, otp::expiry_from_now()).await?;

        match &state.mailer {
            Some(mailer) => {
                if let Err(e) = mailer.send_reset_otp(&user.email, &code).await {
                    tracing::error!("failed to send reset OTP to {}: {}", user.email, e);
                }
            }
            None => tracing::warn!("mail not configured, reset OTP for {} not sent", user.email),
        }
    }

    Ok(Json(MessageResponse::new(GENERIC_RESPONSE)))
}

/// Finish the reset: check the OTP and expiry, set the new password,
/// invalidate all sessions.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let pool: &PgPool = state
        .db_pool
        .as_ref()
        .ok_or(ApiError::ServiceUnavailable("database"))?;

    if request.password.len() < 6 {
        return Err(ApiError::bad_request(
            "password must be at least 6 characters",
        ));
    }

    let email = request.email.trim().to_lowercase();
    let user = users::get_user_by_email(pool, &email)
        .await?
        .ok_or_else(|| ApiError::bad_request("invalid or expired otp"))?;

    let otp_hash = user
        .reset_otp
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("invalid or expired otp"))?;
    let expires_at = user
        .otp_expires_at
        .ok_or_else(|| ApiError::bad_request("invalid or expired otp"))?;

    if otp::is_expired(expires_at) || !otp::verify_otp(request.otp.trim(), otp_hash) {
        return Err(ApiError::bad_request("invalid or expired otp"));
    }

    let password_hash = bcrypt::hash(&request.password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::Internal(format!("failed to hash password: {}", e)))?;
    users::set_password(pool, user.id, &password_hash).await?;
    sessions::invalidate_user_sessions(pool, user.id).await?;

    tracing::info!("password reset for {}", user.email);
    Ok(Json(MessageResponse::new("password reset successfully")))
}
