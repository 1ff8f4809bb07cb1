//! Session records and JWT tokens.
//!
//! Logins are backed by a session row plus a token pair: a short-lived
//! access token carrying the caller's identity and a long-lived refresh
//! token carrying only the user and session ids. Refreshing requires the
//! session row to still be valid; logout and admin user-updates invalidate
//! sessions instead of deleting them.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::shared::user::User;

/// Access tokens live 15 minutes.
pub const ACCESS_TOKEN_TTL_SECS: u64 = 15 * 60;
/// Refresh tokens live 7 days.
pub const REFRESH_TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Access-token claims
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User id
    pub sub: String,
    pub email: String,
    pub role: String,
    pub branch_id: String,
    /// Session id backing this token
    pub session: String,
    pub iat: u64,
    pub exp: u64,
}

/// Refresh-token claims: identity only, re-checked against the session row
/// on refresh
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// User id
    pub sub: String,
    /// Session id
    pub session: String,
    pub iat: u64,
    pub exp: u64,
}

/// Login session record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub valid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn jwt_secret() -> String {
    std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("JWT_SECRET not set, using development fallback");
        "change-this-secret-in-production".to_string()
    })
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Issue an access token for a user and session.
pub fn create_access_token(
    user: &User,
    session_id: Uuid,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = unix_now();
    let claims = AccessClaims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        role: user.role.clone(),
        branch_id: user.branch_id.to_string(),
        session: session_id.to_string(),
        iat: now,
        exp: now + ACCESS_TOKEN_TTL_SECS,
    };
    let key = EncodingKey::from_secret(jwt_secret().as_ref());
    encode(&Header::default(), &claims, &key)
}

/// Issue a refresh token for a user and session.
pub fn create_refresh_token(
    user_id: Uuid,
    session_id: Uuid,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = unix_now();
    let claims = RefreshClaims {
        sub: user_id.to_string(),
        session: session_id.to_string(),
        iat: now,
        exp: now + REFRESH_TOKEN_TTL_SECS,
    };
    let key = EncodingKey::from_secret(jwt_secret().as_ref());
    encode(&Header::default(), &claims, &key)
}

/// Verify and decode an access token.
pub fn verify_access_token(token: &str) -> Result<AccessClaims, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_secret(jwt_secret().as_ref());
    let data = decode::<AccessClaims>(token, &key, &Validation::default())?;
    Ok(data.claims)
}

/// Verify and decode a refresh token.
pub fn verify_refresh_token(token: &str) -> Result<RefreshClaims, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_secret(jwt_secret().as_ref());
    let data = decode::<RefreshClaims>(token, &key, &Validation::default())?;
    Ok(data.claims)
}

/// Create a session for a user.
pub async fn create_session(pool: &PgPool, user_id: Uuid) -> Result<Session, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as::<_, Session>(
        r#"
        INSERT INTO sessions (id, user_id, valid, created_at, updated_at)
        VALUES ($1, $2, TRUE, $3, $3)
        RETURNING id, user_id, valid, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(now)
    .fetch_one(pool)
    .await
}

/// Newest valid session for a user, when one exists.
pub async fn find_valid_session(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        r#"
        SELECT id, user_id, valid, created_at, updated_at
        FROM sessions
        WHERE user_id = $1 AND valid
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Look up a session by id.
pub async fn find_session(pool: &PgPool, id: Uuid) -> Result<Option<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        r#"
        SELECT id, user_id, valid, created_at, updated_at
        FROM sessions
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Invalidate every session of a user. Returns the number of sessions
/// touched.
pub async fn invalidate_user_sessions(pool: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE sessions SET valid = FALSE, updated_at = $1 WHERE user_id = $2 AND valid
        "#,
    )
    .bind(Utc::now())
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            name: "Test User".to_string(),
            email: "test@example.com".to_string(),
            password_hash: "hash".to_string(),
            role: "user".to_string(),
            branch_id: Uuid::new_v4(),
            branch_name: "Main".to_string(),
            active: true,
            profile_image: String::new(),
            profession: String::new(),
            reset_otp: None,
            otp_expires_at: None,
            online: false,
            last_seen: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_access_token_round_trip() {
        let user = test_user();
        let session_id = Uuid::new_v4();
        let token = create_access_token(&user, session_id).unwrap();

        let claims = verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.role, "user");
        assert_eq!(claims.branch_id, user.branch_id.to_string());
        assert_eq!(claims.session, session_id.to_string());
        assert!(claims.exp > claims.iat);
        assert_eq!(claims.exp - claims.iat, ACCESS_TOKEN_TTL_SECS);
    }

    #[test]
    fn test_refresh_token_round_trip() {
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let token = create_refresh_token(user_id, session_id).unwrap();

        let claims = verify_refresh_token(&token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.session, session_id.to_string());
        assert_eq!(claims.exp - claims.iat, REFRESH_TOKEN_TTL_SECS);
    }

    #[test]
    fn test_garbage_tokens_fail() {
        assert!(verify_access_token("not.a.token").is_err());
        assert!(verify_refresh_token("").is_err());
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let token = create_refresh_token(Uuid::new_v4(), Uuid::new_v4()).unwrap();
        // Refresh claims lack the identity fields, so access verification
        // must reject the token.
        assert!(verify_access_token(&token).is_err());
    }
}
