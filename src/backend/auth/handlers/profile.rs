//! Self-service profile update (PUT /profile).

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use sqlx::PgPool;

use crate::backend::auth::users;
use crate::backend::error::ApiError;
use crate::backend::middleware::auth::AuthUser;
use crate::backend::server::state::AppState;
use crate::backend::storage::s3::S3Client;
use crate::backend::storage::upload;
use crate::shared::user::UserPublic;

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub success: bool,
    pub message: String,
    pub user: UserPublic,
}

/// Update the caller's profession and/or profile image.
///
/// Multipart body: optional `profession` text field, optional
/// `profileImage` file. A replaced image is deleted from storage
/// best-effort after the row is updated.
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    mut multipart: Multipart,
) -> Result<Json<ProfileResponse>, ApiError> {
    let pool: &PgPool = state
        .db_pool
        .as_ref()
        .ok_or(ApiError::ServiceUnavailable("database"))?;

    let payload = upload::read_multipart(&mut multipart).await?;
    let profession = payload
        .text("profession")
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());

    let has_image = payload.files.iter().any(|f| f.field == "profileImage");
    if profession.is_none() && !has_image {
        return Err(ApiError::bad_request("no data provided to update"));
    }

    let previous_image = users::get_user_by_id(pool, auth.user_id)
        .await?
        .map(|u| u.profile_image)
        .unwrap_or_default();

    let mut new_image_url = None;
    if has_image {
        let storage = state
            .storage
            .as_ref()
            .ok_or(ApiError::ServiceUnavailable("object storage"))?;
        let stored = upload::store_all(storage, payload.files).await?;
        new_image_url = upload::find_upload(&stored, "profileImage").map(|u| u.url.clone());
    }

    let user = users::update_profile(
        pool,
        auth.user_id,
        profession.as_deref(),
        new_image_url.as_deref(),
    )
    .await?
    .ok_or_else(|| ApiError::not_found("user not found"))?;

    // Old image cleanup is best-effort; the profile row is already updated.
    if new_image_url.is_some() && !previous_image.is_empty() {
        if let (Some(storage), Some(key)) =
            (&state.storage, S3Client::key_from_url(&previous_image))
        {
            if let Err(e) = storage.delete_object(&key).await {
                tracing::warn!("could not delete old profile image {}: {}", key, e);
            }
        }
    }

    Ok(Json(ProfileResponse {
        success: true,
        message: "profile updated successfully".to_string(),
        user: user.public(),
    }))
}
