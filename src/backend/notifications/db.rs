//! Database operations for device tokens.

use chrono::Utc;
use sqlx::PgPool;

use crate::shared::notification::DeviceToken;

/// Insert a device token or update its project/platform/meta. The badge
/// counter is preserved across re-registrations.
pub async fn upsert_token(
    pool: &PgPool,
    token: &str,
    project_id: &str,
    platform: &str,
    meta: serde_json::Value,
) -> Result<DeviceToken, sqlx::Error> {
    sqlx::query_as::<_, DeviceToken>(
        r#"
        INSERT INTO device_tokens (token, project_id, platform, badge, meta, created_at)
        VALUES ($1, $2, $3, 0, $4, $5)
        ON CONFLICT (token) DO UPDATE
        SET project_id = EXCLUDED.project_id,
            platform = EXCLUDED.platform,
            meta = EXCLUDED.meta
        RETURNING token, project_id, platform, badge, meta, created_at
        "#,
    )
    .bind(token)
    .bind(project_id)
    .bind(platform)
    .bind(meta)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

/// All devices registered under a project
pub async fn list_tokens_by_project(
    pool: &PgPool,
    project_id: &str,
) -> Result<Vec<DeviceToken>, sqlx::Error> {
    sqlx::query_as::<_, DeviceToken>(
        r#"
        SELECT token, project_id, platform, badge, meta, created_at
        FROM device_tokens
        WHERE project_id = $1
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
}

/// Increment a device badge and return the new value, `None` when the token
/// is unknown.
pub async fn increment_badge(pool: &PgPool, token: &str) -> Result<Option<i32>, sqlx::Error> {
    let row: Option<(i32,)> = sqlx::query_as(
        r#"
        UPDATE device_tokens SET badge = badge + 1 WHERE token = $1 RETURNING badge
        "#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(badge,)| badge))
}

/// Reset a device badge to zero. Returns whether the token existed.
pub async fn reset_badge(pool: &PgPool, token: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE device_tokens SET badge = 0 WHERE token = $1
        "#,
    )
    .bind(token)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
