//! User directory and admin user management.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::backend::auth::users::{self, UserUpdate};
use crate::backend::auth::sessions;
use crate::backend::branches;
use crate::backend::error::ApiError;
use crate::backend::middleware::auth::AuthUser;
use crate::backend::realtime::presence::PresenceRegistry;
use crate::backend::server::state::AppState;
use crate::shared::user::{UserPublic, UserStatus, ROLE_ADMIN, ROLE_USER};

use super::types::{MessageResponse, UpdateUserRequest};

#[derive(Debug, Deserialize)]
pub struct BranchUsersQuery {
    pub branch_id: Option<Uuid>,
    pub branch_name: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub skip: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BranchUsersPage {
    pub success: bool,
    pub branch_id: Uuid,
    pub branch_name: String,
    pub count: usize,
    pub limit: i64,
    pub skip: i64,
    pub users: Vec<UserPublic>,
}

fn require_pool(pool: &Option<PgPool>) -> Result<&PgPool, ApiError> {
    pool.as_ref().ok_or(ApiError::ServiceUnavailable("database"))
}

/// All users sorted by name (GET /users).
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
) -> Result<Json<Vec<UserPublic>>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    let users = users::list_users(pool).await?;
    Ok(Json(users.iter().map(|u| u.public()).collect()))
}

/// Single user (GET /users/{id}).
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserPublic>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    let user = users::get_user_by_id(pool, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok(Json(user.public()))
}

/// Online/last-seen status (GET /users/{id}/status).
///
/// A user with a live SSE stream is reported online regardless of the
/// stored column, which only changes on stream edges.
pub async fn user_status(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserStatus>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    let presence: PresenceRegistry = state.presence.clone();

    let user = users::get_user_by_id(pool, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    Ok(Json(UserStatus {
        online: presence.is_online(user_id) || user.online,
        last_seen: user.last_seen,
    }))
}

/// Admin field update (POST /users/{id}).
///
/// Admins cannot edit themselves here; a successful update invalidates the
/// target's sessions so stale tokens stop working.
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(user_id): Path<Uuid>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;

    if !auth.is_admin() {
        return Err(ApiError::forbidden("admins only"));
    }
    if user_id == auth.user_id {
        return Err(ApiError::bad_request("you cannot update your own profile"));
    }

    if let Some(role) = request.role.as_deref() {
        if role != ROLE_USER && role != ROLE_ADMIN {
            return Err(ApiError::bad_request("invalid role"));
        }
    }

    // A branch change needs the canonical branch name alongside the id.
    let branch = match request.branch_id {
        Some(branch_id) => Some(
            branches::db::find_active_by_id(pool, branch_id)
                .await?
                .ok_or_else(|| ApiError::bad_request("invalid or inactive branch"))?,
        ),
        None => None,
    };

    let updated = users::update_user(
        pool,
        user_id,
        UserUpdate {
            name: request.name,
            role: request.role,
            branch_id: branch.as_ref().map(|b| b.id),
            branch_name: branch.map(|b| b.name),
            active: request.active,
            profession: request.profession,
        },
    )
    .await?;

    if updated.is_none() {
        return Err(ApiError::not_found("user not found"));
    }

    sessions::invalidate_user_sessions(pool, user_id).await?;
    Ok(Json(MessageResponse::new("user updated successfully")))
}

/// Users of a branch (GET /users/by-branch).
///
/// Defaults to the caller's branch; admins may select another via
/// `branch_id` or `branch_name`.
pub async fn users_by_branch(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Query(query): Query<BranchUsersQuery>,
) -> Result<Json<BranchUsersPage>, ApiError> {
    let pool = require_pool(&state.db_pool)?;

    let target = if auth.is_admin() && (query.branch_id.is_some() || query.branch_name.is_some()) {
        let branch = match query.branch_id {
            Some(id) => branches::db::find_active_by_id(pool, id).await?,
            None => {
                let name = query.branch_name.as_deref().unwrap_or_default();
                branches::db::find_active_by_name(pool, name).await?
            }
        };
        branch.ok_or_else(|| ApiError::not_found("branch not found or inactive"))?
    } else {
        branches::db::find_active_by_id(pool, auth.branch_id)
            .await?
            .ok_or_else(|| ApiError::bad_request("user branch not found"))?
    };

    let limit = query.limit.unwrap_or(30).clamp(1, 100);
    let skip = query.skip.unwrap_or(0).max(0);

    let users = users::list_users_by_branch(
        pool,
        target.id,
        query.search.as_deref(),
        limit,
        skip,
    )
    .await?;

    Ok(Json(BranchUsersPage {
        success: true,
        branch_id: target.id,
        branch_name: target.name,
        count: users.len(),
        limit,
        skip,
        users: users.iter().map(|u| u.public()).collect(),
    }))
}
