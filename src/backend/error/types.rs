//! Backend error types.
//!
//! Every handler returns `Result<_, ApiError>`; the `IntoResponse`
//! implementation in [`super::conversion`] turns the error into a JSON body
//! with the mapped status code. Database and storage failures are reported
//! to the client with a generic message, the details stay in the logs.

use axum::http::StatusCode;
use thiserror::Error;

use crate::backend::storage::s3::StorageError;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Missing, malformed or expired credentials
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed
    #[error("{0}")]
    Forbidden(String),

    /// Requested entity does not exist
    #[error("{0}")]
    NotFound(String),

    /// Invalid request body or parameters
    #[error("{0}")]
    BadRequest(String),

    /// Uniqueness conflict (duplicate branch, group name, ...)
    #[error("{0}")]
    Conflict(String),

    /// A required service (database, object storage, push) is not configured
    #[error("{0} not configured")]
    ServiceUnavailable(&'static str),

    /// Object storage request failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Anything else
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Internal(_) | Self::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message exposed to the client. Internal failure details are replaced
    /// with a generic message.
    pub fn message(&self) -> String {
        match self {
            Self::Database(_) | Self::Internal(_) | Self::Storage(_) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            ApiError::unauthorized("no token").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::forbidden("admin only").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::not_found("group not found").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::bad_request("empty message").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::conflict("branch already exists").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::ServiceUnavailable("database").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Database(sqlx::Error::RowNotFound).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let error = ApiError::Database(sqlx::Error::RowNotFound);
        assert_eq!(error.message(), "internal server error");

        let error = ApiError::ServiceUnavailable("database");
        assert_eq!(error.message(), "database not configured");

        let error = ApiError::bad_request("invalid amount");
        assert_eq!(error.message(), "invalid amount");
    }
}
