//! Registration handler (POST /register).

use axum::{extract::State, Json};
use sqlx::PgPool;

use crate::backend::auth::users::{self, NewUser};
use crate::backend::branches;
use crate::backend::error::ApiError;
use crate::backend::server::state::AppState;
use crate::shared::user::ROLE_USER;

use super::types::{RegisterRequest, RegisterResponse};

/// Register a new account.
///
/// The branch may be given by id (must exist and be active) or by name
/// (looked up case-insensitively, created when absent). Duplicate emails
/// are rejected.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let pool: &PgPool = state
        .db_pool
        .as_ref()
        .ok_or(ApiError::ServiceUnavailable("database"))?;

    let name = request.name.trim();
    let email = request.email.trim().to_lowercase();
    if name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("a valid email is required"));
    }
    if request.password.len() < 6 {
        return Err(ApiError::bad_request(
            "password must be at least 6 characters",
        ));
    }

    if users::get_user_by_email(pool, &email).await?.is_some() {
        return Err(ApiError::bad_request("email already exists"));
    }

    let branch = branches::db::resolve_or_create(
        pool,
        request.branch_id,
        request.branch_name.as_deref(),
    )
    .await?;

    let password_hash = bcrypt::hash(&request.password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::Internal(format!("failed to hash password: {}", e)))?;

    let user = users::create_user(
        pool,
        NewUser {
            name: name.to_string(),
            email,
            password_hash,
            role: ROLE_USER.to_string(),
            branch_id: branch.id,
            branch_name: branch.name,
            profession: request.profession.unwrap_or_default(),
            profile_image: String::new(),
        },
    )
    .await
    .map_err(|e| {
        if branches::db::is_unique_violation(&e) {
            ApiError::bad_request("email already exists")
        } else {
            e.into()
        }
    })?;

    tracing::info!("registered user {} ({})", user.name, user.email);

    Ok(Json(RegisterResponse {
        message: "registered successfully".to_string(),
        user: user.public(),
    }))
}
