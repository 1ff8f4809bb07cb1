//! HTTP handlers for device registration and push delivery.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::backend::error::ApiError;
use crate::backend::notifications::db;
use crate::backend::notifications::fcm::PushMessage;
use crate::backend::server::state::AppState;
use crate::shared::notification::DeviceToken;

#[derive(Debug, Deserialize)]
pub struct SaveTokenRequest {
    pub token: String,
    pub project_id: String,
    pub platform: Option<String>,
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct SaveTokenResponse {
    pub success: bool,
    pub device: DeviceToken,
}

#[derive(Debug, Deserialize)]
pub struct SendByProjectRequest {
    pub project_id: String,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct SendOutcome {
    pub token: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendByProjectResponse {
    pub success: bool,
    pub sent: usize,
    pub results: Vec<SendOutcome>,
}

#[derive(Debug, Deserialize)]
pub struct ResetBadgeRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ResetBadgeResponse {
    pub success: bool,
}

fn require_pool(pool: &Option<PgPool>) -> Result<&PgPool, ApiError> {
    pool.as_ref().ok_or(ApiError::ServiceUnavailable("database"))
}

/// Register a device token or move it to another project (POST
/// /notifications/token).
pub async fn save_token(
    State(state): State<AppState>,
    Json(request): Json<SaveTokenRequest>,
) -> Result<Json<SaveTokenResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;

    if request.token.trim().is_empty() || request.project_id.trim().is_empty() {
        return Err(ApiError::bad_request("token and project_id are required"));
    }

    let device = db::upsert_token(
        pool,
        request.token.trim(),
        request.project_id.trim(),
        request.platform.as_deref().unwrap_or("android"),
        request.meta.unwrap_or_else(|| serde_json::json!({})),
    )
    .await?;

    Ok(Json(SaveTokenResponse {
        success: true,
        device,
    }))
}

/// Push to every device under a project, bumping each device badge
/// (POST /notifications/send).
pub async fn send_by_project(
    State(state): State<AppState>,
    Json(request): Json<SendByProjectRequest>,
) -> Result<Json<SendByProjectResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    let push = state
        .push
        .as_ref()
        .ok_or(ApiError::ServiceUnavailable("push notifications"))?;

    if request.project_id.trim().is_empty()
        || request.title.trim().is_empty()
        || request.message.trim().is_empty()
    {
        return Err(ApiError::bad_request(
            "project_id, title and message are required",
        ));
    }

    let devices = db::list_tokens_by_project(pool, request.project_id.trim()).await?;
    let data = request.data.unwrap_or_else(|| serde_json::json!({}));

    let mut results = Vec::with_capacity(devices.len());
    for device in devices {
        let badge = db::increment_badge(pool, &device.token)
            .await?
            .unwrap_or(device.badge + 1);

        let message = PushMessage {
            title: request.title.clone(),
            body: request.message.clone(),
            data: data.clone(),
            badge,
        };

        match push.send_to_token(&device.token, &message).await {
            Ok(response) => results.push(SendOutcome {
                token: device.token,
                success: true,
                response: Some(response),
                error: None,
            }),
            Err(e) => {
                tracing::warn!("push to {} failed: {}", device.token, e);
                results.push(SendOutcome {
                    token: device.token,
                    success: false,
                    response: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    Ok(Json(SendByProjectResponse {
        success: true,
        sent: results.iter().filter(|r| r.success).count(),
        results,
    }))
}

/// Zero a device badge, typically on app open (POST
/// /notifications/reset-badge).
pub async fn reset_badge(
    State(state): State<AppState>,
    Json(request): Json<ResetBadgeRequest>,
) -> Result<Json<ResetBadgeResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;

    if request.token.trim().is_empty() {
        return Err(ApiError::bad_request("token is required"));
    }

    if !db::reset_badge(pool, request.token.trim()).await? {
        return Err(ApiError::not_found("token not found"));
    }

    Ok(Json(ResetBadgeResponse { success: true }))
}
