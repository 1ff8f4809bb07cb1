//! Database operations for branches.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::backend::error::ApiError;
use crate::shared::user::Branch;

/// Create a branch. Name is trimmed; code is trimmed and uppercased.
pub async fn create_branch(
    pool: &PgPool,
    name: &str,
    code: Option<&str>,
) -> Result<Branch, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as::<_, Branch>(
        r#"
        INSERT INTO branches (id, name, code, is_active, created_at, updated_at)
        VALUES ($1, $2, $3, TRUE, $4, $4)
        RETURNING id, name, code, is_active, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name.trim())
    .bind(code.map(|c| c.trim().to_uppercase()))
    .bind(now)
    .fetch_one(pool)
    .await
}

/// Active branch by id.
pub async fn find_active_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Branch>, sqlx::Error> {
    sqlx::query_as::<_, Branch>(
        r#"
        SELECT id, name, code, is_active, created_at, updated_at
        FROM branches
        WHERE id = $1 AND is_active
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Active branch by case-insensitive name.
pub async fn find_active_by_name(pool: &PgPool, name: &str) -> Result<Option<Branch>, sqlx::Error> {
    sqlx::query_as::<_, Branch>(
        r#"
        SELECT id, name, code, is_active, created_at, updated_at
        FROM branches
        WHERE LOWER(name) = LOWER($1) AND is_active
        "#,
    )
    .bind(name.trim())
    .fetch_optional(pool)
    .await
}

/// All active branches sorted by name.
pub async fn list_active(pool: &PgPool) -> Result<Vec<Branch>, sqlx::Error> {
    sqlx::query_as::<_, Branch>(
        r#"
        SELECT id, name, code, is_active, created_at, updated_at
        FROM branches
        WHERE is_active
        ORDER BY name ASC
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Resolve the branch for a registration: a given id must point at an
/// active branch; a given name is looked up case-insensitively and created
/// as an active branch when absent.
pub async fn resolve_or_create(
    pool: &PgPool,
    branch_id: Option<Uuid>,
    branch_name: Option<&str>,
) -> Result<Branch, ApiError> {
    if let Some(id) = branch_id {
        return find_active_by_id(pool, id)
            .await?
            .ok_or_else(|| ApiError::bad_request("invalid or inactive branch"));
    }

    let name = branch_name
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::bad_request("branch id or branch name is required"))?;

    if let Some(branch) = find_active_by_name(pool, name).await? {
        return Ok(branch);
    }

    match create_branch(pool, name, None).await {
        Ok(branch) => Ok(branch),
        // Lost a race against a concurrent registration with the same name.
        Err(e) if is_unique_violation(&e) => find_active_by_name(pool, name)
            .await?
            .ok_or_else(|| ApiError::bad_request("invalid or inactive branch")),
        Err(e) => Err(e.into()),
    }
}

/// Whether a sqlx error is a unique-constraint violation.
pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}
