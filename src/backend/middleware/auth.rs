//! Authentication middleware.
//!
//! Extracts the Bearer token from the Authorization header, verifies the
//! access-token claims and attaches an [`AuthenticatedUser`] to the request
//! extensions. When a database is configured the user must still exist and
//! be active.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::backend::auth::sessions::verify_access_token;
use crate::backend::error::ApiError;
use crate::backend::server::state::AppState;
use crate::shared::user::ROLE_ADMIN;

/// Authenticated caller data extracted from the access token
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
    pub branch_id: Uuid,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

/// Authentication middleware for the protected route group.
///
/// Returns 401 when the token is missing, malformed, expired, or when the
/// user behind it no longer exists or was deactivated.
pub async fn auth_middleware(
    State(app_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("missing Authorization header");
            ApiError::unauthorized("no token provided")
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::warn!("invalid Authorization header format");
        ApiError::unauthorized("invalid auth header")
    })?;

    let claims = verify_access_token(token).map_err(|e| {
        tracing::warn!("invalid token: {:?}", e);
        ApiError::unauthorized("invalid or expired token")
    })?;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| ApiError::unauthorized("invalid or expired token"))?;
    let branch_id = Uuid::parse_str(&claims.branch_id)
        .map_err(|_| ApiError::unauthorized("invalid or expired token"))?;

    if let Some(pool) = &app_state.db_pool {
        verify_user_active(pool, user_id).await.map_err(|e| {
            tracing::warn!("token user not usable: {:?}", e);
            ApiError::unauthorized("invalid or expired token")
        })?;
    }

    request.extensions_mut().insert(AuthenticatedUser {
        user_id,
        email: claims.email,
        role: claims.role,
        branch_id,
    });

    Ok(next.run(request).await)
}

/// The user behind a token must still exist and be active.
async fn verify_user_active(pool: &PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
    let user = crate::backend::auth::users::get_user_by_id(pool, user_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    if !user.active {
        return Err(sqlx::Error::RowNotFound);
    }
    Ok(())
}

/// Extractor for the authenticated caller, set by [`auth_middleware`].
#[derive(Clone, Debug)]
pub struct AuthUser(pub AuthenticatedUser);

impl<S: Send + Sync> axum::extract::FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| {
                tracing::warn!("AuthenticatedUser missing from request extensions");
                ApiError::unauthorized("unauthorized")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::FromRequestParts;

    fn parts_with(user: Option<AuthenticatedUser>) -> axum::http::request::Parts {
        let mut request = axum::http::Request::builder()
            .uri("http://example.com/conversations")
            .body(())
            .unwrap();
        if let Some(user) = user {
            request.extensions_mut().insert(user);
        }
        request.into_parts().0
    }

    #[tokio::test]
    async fn test_extract_authenticated_user() {
        let user = AuthenticatedUser {
            user_id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            role: "user".to_string(),
            branch_id: Uuid::new_v4(),
        };
        let mut parts = parts_with(Some(user.clone()));

        let extracted = AuthUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(extracted.0.user_id, user.user_id);
        assert!(!extracted.0.is_admin());
    }

    #[tokio::test]
    async fn test_extract_missing_user_is_unauthorized() {
        let mut parts = parts_with(None);
        let result = AuthUser::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_admin_flag() {
        let admin = AuthenticatedUser {
            user_id: Uuid::new_v4(),
            email: "admin@example.com".to_string(),
            role: "admin".to_string(),
            branch_id: Uuid::new_v4(),
        };
        assert!(admin.is_admin());
    }
}
