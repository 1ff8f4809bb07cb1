//! User database operations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::shared::user::User;

const USER_COLUMNS: &str = "id, name, email, password_hash, role, branch_id, branch_name, active, \
     profile_image, profession, reset_otp, otp_expires_at, online, last_seen, created_at, updated_at";

/// Fields for a new user row
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub branch_id: Uuid,
    pub branch_name: String,
    pub profession: String,
    pub profile_image: String,
}

/// Admin-applied field updates; `None` leaves a column untouched
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub role: Option<String>,
    pub branch_id: Option<Uuid>,
    pub branch_name: Option<String>,
    pub active: Option<bool>,
    pub profession: Option<String>,
}

/// Create a new user.
pub async fn create_user(pool: &PgPool, new_user: NewUser) -> Result<User, sqlx::Error> {
    let query = format!(
        r#"
        INSERT INTO users (id, name, email, password_hash, role, branch_id, branch_name,
                           active, profile_image, profession, online, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8, $9, FALSE, $10, $10)
        RETURNING {USER_COLUMNS}
        "#
    );
    sqlx::query_as::<_, User>(&query)
        .bind(Uuid::new_v4())
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.role)
        .bind(new_user.branch_id)
        .bind(&new_user.branch_name)
        .bind(&new_user.profile_image)
        .bind(&new_user.profession)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
}

/// Get a user by email.
pub async fn get_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
    sqlx::query_as::<_, User>(&query)
        .bind(email)
        .fetch_optional(pool)
        .await
}

/// Get a user by id.
pub async fn get_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    sqlx::query_as::<_, User>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// All users, sorted by name.
pub async fn list_users(pool: &PgPool) -> Result<Vec<User>, sqlx::Error> {
    let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY name ASC");
    sqlx::query_as::<_, User>(&query).fetch_all(pool).await
}

/// Users of a branch with optional case-insensitive name/email search,
/// sorted by name.
pub async fn list_users_by_branch(
    pool: &PgPool,
    branch_id: Uuid,
    search: Option<&str>,
    limit: i64,
    skip: i64,
) -> Result<Vec<User>, sqlx::Error> {
    let query = format!(
        r#"
        SELECT {USER_COLUMNS} FROM users
        WHERE branch_id = $1
          AND ($2::text IS NULL OR name ILIKE $2 OR email ILIKE $2)
        ORDER BY name ASC
        LIMIT $3 OFFSET $4
        "#
    );
    let pattern = search
        .filter(|s| !s.trim().is_empty())
        .map(|s| format!("%{}%", s.trim()));
    sqlx::query_as::<_, User>(&query)
        .bind(branch_id)
        .bind(pattern)
        .bind(limit)
        .bind(skip)
        .fetch_all(pool)
        .await
}

/// Apply an admin field update; untouched columns keep their value.
pub async fn update_user(
    pool: &PgPool,
    id: Uuid,
    update: UserUpdate,
) -> Result<Option<User>, sqlx::Error> {
    let query = format!(
        r#"
        UPDATE users SET
            name = COALESCE($2, name),
            role = COALESCE($3, role),
            branch_id = COALESCE($4, branch_id),
            branch_name = COALESCE($5, branch_name),
            active = COALESCE($6, active),
            profession = COALESCE($7, profession),
            updated_at = $8
        WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#
    );
    sqlx::query_as::<_, User>(&query)
        .bind(id)
        .bind(update.name)
        .bind(update.role)
        .bind(update.branch_id)
        .bind(update.branch_name)
        .bind(update.active)
        .bind(update.profession)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
}

/// Self-service profile update: profession and/or profile image.
pub async fn update_profile(
    pool: &PgPool,
    id: Uuid,
    profession: Option<&str>,
    profile_image: Option<&str>,
) -> Result<Option<User>, sqlx::Error> {
    let query = format!(
        r#"
        UPDATE users SET
            profession = COALESCE($2, profession),
            profile_image = COALESCE($3, profile_image),
            updated_at = $4
        WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#
    );
    sqlx::query_as::<_, User>(&query)
        .bind(id)
        .bind(profession)
        .bind(profile_image)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
}

/// Replace the password hash and clear any outstanding reset OTP.
pub async fn set_password(pool: &PgPool, id: Uuid, password_hash: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE users
        SET password_hash = $2, reset_otp = NULL, otp_expires_at = NULL, updated_at = $3
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(password_hash)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Store a hashed reset OTP with its expiry.
pub async fn set_reset_otp(
    pool: &PgPool,
    id: Uuid,
    otp_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE users SET reset_otp = $2, otp_expires_at = $3, updated_at = $4 WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(otp_hash)
    .bind(expires_at)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Record an online transition; going offline stamps `last_seen`.
pub async fn set_online(pool: &PgPool, id: Uuid, online: bool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE users
        SET online = $2,
            last_seen = CASE WHEN $2 THEN last_seen ELSE $3 END,
            updated_at = $3
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(online)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}
