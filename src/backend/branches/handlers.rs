//! HTTP handlers for branch management.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::backend::auth::users;
use crate::backend::branches::db;
use crate::backend::error::ApiError;
use crate::backend::middleware::auth::AuthUser;
use crate::backend::server::state::AppState;
use crate::shared::user::{Branch, UserPublic};

#[derive(Debug, Deserialize)]
pub struct CreateBranchRequest {
    pub name: String,
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BranchUsersResponse {
    pub success: bool,
    pub branch: Branch,
    pub users: Vec<UserPublic>,
}

fn require_pool(pool: &Option<PgPool>) -> Result<&PgPool, ApiError> {
    pool.as_ref().ok_or(ApiError::ServiceUnavailable("database"))
}

/// Create a branch (POST /branches, admin only).
pub async fn create_branch(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateBranchRequest>,
) -> Result<Json<Branch>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    if !user.is_admin() {
        return Err(ApiError::forbidden("admin access required"));
    }

    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("branch name is required"));
    }

    match db::create_branch(pool, name, request.code.as_deref()).await {
        Ok(branch) => Ok(Json(branch)),
        Err(e) if db::is_unique_violation(&e) => {
            Err(ApiError::conflict("branch already exists"))
        }
        Err(e) => Err(e.into()),
    }
}

/// List active branches (GET /admin/branches).
pub async fn list_branches(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
) -> Result<Json<Vec<Branch>>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    Ok(Json(db::list_active(pool).await?))
}

/// Users of one branch (GET /admin/branches/{id}/users).
pub async fn branch_users(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(branch_id): Path<Uuid>,
) -> Result<Json<BranchUsersResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;

    let branch = db::find_active_by_id(pool, branch_id)
        .await?
        .ok_or_else(|| ApiError::not_found("branch not found or inactive"))?;

    let users = users::list_users_by_branch(pool, branch.id, None, 1000, 0)
        .await?
        .iter()
        .map(|u| u.public())
        .collect();

    Ok(Json(BranchUsersResponse {
        success: true,
        branch,
        users,
    }))
}
