//! HTTP handlers for payment records.
//!
//! Admins see and edit everything; users see and delete their own. A
//! replaced receipt image is deleted from storage only after the row is
//! updated, so a failed storage delete never loses record data.

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::backend::error::ApiError;
use crate::backend::middleware::auth::AuthUser;
use crate::backend::payments::db::{self, NewPayment, PaymentFilter, PaymentUpdate};
use crate::backend::server::state::AppState;
use crate::backend::storage::s3::S3Client;
use crate::backend::storage::upload;
use crate::shared::payment::{parse_amount, Payment, PaymentMethod};

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub success: bool,
    pub data: Payment,
}

#[derive(Debug, Serialize)]
pub struct PaymentListResponse {
    pub success: bool,
    pub data: Vec<Payment>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub struct PaymentListQuery {
    pub method: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

fn require_pool(pool: &Option<PgPool>) -> Result<&PgPool, ApiError> {
    pool.as_ref().ok_or(ApiError::ServiceUnavailable("database"))
}

fn parse_bound(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|v| DateTime::parse_from_rfc3339(v.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Create a payment record (POST /payments).
///
/// Multipart fields: `client_name`, `client_phone?`, `source`, `amount`,
/// `tx_id`, `method`, plus the required `paymentImage` file.
pub async fn create_payment(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    mut multipart: Multipart,
) -> Result<Json<PaymentResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;

    let payload = upload::read_multipart(&mut multipart).await?;

    let client_name = payload
        .text("client_name")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request("client_name is required"))?;
    let source = payload
        .text("source")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request("source is required"))?;
    let tx_id = payload
        .text("tx_id")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request("tx_id is required"))?;
    let amount = payload
        .text("amount")
        .and_then(parse_amount)
        .ok_or_else(|| ApiError::bad_request("invalid amount"))?;
    let method = payload
        .text("method")
        .and_then(PaymentMethod::from_str)
        .ok_or_else(|| ApiError::bad_request("invalid method"))?;
    let client_phone = payload
        .text("client_phone")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let has_image = payload.files.iter().any(|f| f.field == "paymentImage");
    if !has_image {
        return Err(ApiError::bad_request("payment image is required"));
    }
    let storage = state
        .storage
        .as_ref()
        .ok_or(ApiError::ServiceUnavailable("object storage"))?;
    let stored = upload::store_all(storage, payload.files).await?;
    let image_url = upload::find_upload(&stored, "paymentImage")
        .map(|u| u.url.clone())
        .ok_or_else(|| ApiError::bad_request("payment image is required"))?;

    let payment = db::create_payment(
        pool,
        NewPayment {
            client_name,
            client_phone,
            user_id: auth.user_id,
            source,
            amount,
            tx_id,
            method: method.as_str().to_string(),
            image_url,
            created_by_role: auth.role.clone(),
        },
    )
    .await?;

    Ok(Json(PaymentResponse {
        success: true,
        data: payment,
    }))
}

/// Listing (GET /payments): admins see all records, users their own.
/// Optional filters: `method` (silently ignored when not a known method),
/// `from`/`to` RFC 3339 bounds.
pub async fn list_payments(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Query(query): Query<PaymentListQuery>,
) -> Result<Json<PaymentListResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;

    let filter = PaymentFilter {
        user_id: if auth.is_admin() {
            None
        } else {
            Some(auth.user_id)
        },
        method: query
            .method
            .as_deref()
            .and_then(PaymentMethod::from_str)
            .map(|m| m.as_str().to_string()),
        from: parse_bound(query.from.as_deref()),
        to: parse_bound(query.to.as_deref()),
    };

    let payments = db::list_payments(pool, filter).await?;
    Ok(Json(PaymentListResponse {
        success: true,
        data: payments,
    }))
}

/// Single record (GET /payments/{id}): owner or admin.
pub async fn get_payment(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;

    let payment = db::get_payment(pool, payment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("payment not found"))?;
    if !auth.is_admin() && payment.user_id != auth.user_id {
        return Err(ApiError::forbidden("not your payment"));
    }

    Ok(Json(PaymentResponse {
        success: true,
        data: payment,
    }))
}

/// Admin update (PUT /payments/{id}). Multipart: any of the text fields
/// plus an optional replacement `paymentImage`.
pub async fn update_payment(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(payment_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<PaymentResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;

    if !auth.is_admin() {
        return Err(ApiError::forbidden("admins only"));
    }

    let current = db::get_payment(pool, payment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("payment not found"))?;

    let payload = upload::read_multipart(&mut multipart).await?;

    let amount = match payload.text("amount") {
        Some(raw) => Some(parse_amount(raw).ok_or_else(|| ApiError::bad_request("invalid amount"))?),
        None => None,
    };
    let method = match payload.text("method") {
        Some(raw) => Some(
            PaymentMethod::from_str(raw)
                .ok_or_else(|| ApiError::bad_request("invalid method"))?
                .as_str()
                .to_string(),
        ),
        None => None,
    };

    let trimmed = |field: &str| {
        payload
            .text(field)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let client_name = trimmed("client_name");
    let client_phone = trimmed("client_phone");
    let source = trimmed("source");
    let tx_id = trimmed("tx_id");

    let mut new_image = None;
    if payload.files.iter().any(|f| f.field == "paymentImage") {
        let storage = state
            .storage
            .as_ref()
            .ok_or(ApiError::ServiceUnavailable("object storage"))?;
        let stored = upload::store_all(storage, payload.files).await?;
        new_image = upload::find_upload(&stored, "paymentImage").map(|u| u.url.clone());
    }

    let updated = db::update_payment(
        pool,
        payment_id,
        PaymentUpdate {
            client_name,
            client_phone,
            source,
            amount,
            tx_id,
            method,
            image_url: new_image.clone(),
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("payment not found"))?;

    // Old receipt cleanup is best-effort; the record already points at the
    // new image.
    if new_image.is_some() {
        if let Some(old_url) = current.image_url.as_deref() {
            if let (Some(storage), Some(key)) = (&state.storage, S3Client::key_from_url(old_url)) {
                if let Err(e) = storage.delete_object(&key).await {
                    tracing::warn!("could not delete old receipt {}: {}", key, e);
                }
            }
        }
    }

    Ok(Json(PaymentResponse {
        success: true,
        data: updated,
    }))
}

/// Delete (DELETE /payments/{id}): owner or admin. The receipt object is
/// removed best-effort after the row.
pub async fn delete_payment(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;

    let payment = db::get_payment(pool, payment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("payment not found"))?;
    if !auth.is_admin() && payment.user_id != auth.user_id {
        return Err(ApiError::forbidden("not your payment"));
    }

    db::delete_payment(pool, payment_id).await?;

    if let Some(url) = payment.image_url.as_deref() {
        if let (Some(storage), Some(key)) = (&state.storage, S3Client::key_from_url(url)) {
            if let Err(e) = storage.delete_object(&key).await {
                tracing::warn!("could not delete receipt {}: {}", key, e);
            }
        }
    }

    Ok(Json(SuccessResponse { success: true }))
}
