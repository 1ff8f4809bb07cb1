//! HTTP handlers for group messaging.

use std::collections::HashMap;

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::backend::auth::users::{self, get_user_by_id};
use crate::backend::branches;
use crate::backend::error::ApiError;
use crate::backend::groups::db;
use crate::backend::middleware::auth::AuthUser;
use crate::backend::server::state::AppState;
use crate::backend::storage::s3::S3Client;
use crate::backend::storage::upload;
use crate::shared::messaging::group::MIN_GROUP_MEMBERS;
use crate::shared::messaging::{Group, GroupMessage, GroupMessageView, GroupSummary, GroupView};
use crate::shared::user::{UserBrief, UserPublic};
use crate::shared::{EventKind, RealtimeEvent};

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub members: Vec<Uuid>,
    pub branch_id: Option<Uuid>,
    pub branch_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GroupResponse {
    pub success: bool,
    pub group: GroupView,
}

#[derive(Debug, Serialize)]
pub struct GroupIdName {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct GroupDetailsResponse {
    pub success: bool,
    pub group: GroupView,
    pub branch_users: Vec<UserPublic>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateMembersRequest {
    #[serde(default)]
    pub add: Vec<Uuid>,
    #[serde(default)]
    pub remove: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct HideMemberRequest {
    pub hide: bool,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<i64>,
    pub before: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct MessagesPage {
    pub success: bool,
    pub messages: Vec<GroupMessageView>,
    pub next_before: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SendGroupMessageResponse {
    pub success: bool,
    pub message: GroupMessageView,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct MarkGroupReadResponse {
    pub success: bool,
    pub updated: u64,
}

fn require_pool(pool: &Option<PgPool>) -> Result<&PgPool, ApiError> {
    pool.as_ref().ok_or(ApiError::ServiceUnavailable("database"))
}

async fn require_group(pool: &PgPool, group_id: Uuid) -> Result<Group, ApiError> {
    db::get_group(pool, group_id)
        .await?
        .ok_or_else(|| ApiError::not_found("group not found"))
}

async fn require_membership(pool: &PgPool, group: &Group, user_id: Uuid) -> Result<(), ApiError> {
    if db::is_member(pool, group.id, user_id).await? {
        Ok(())
    } else {
        Err(ApiError::forbidden("not a group member"))
    }
}

fn require_group_admin(group: &Group, user_id: Uuid) -> Result<(), ApiError> {
    if group.admin_id == user_id {
        Ok(())
    } else {
        Err(ApiError::forbidden("group admin only"))
    }
}

async fn brief_for(
    pool: &PgPool,
    cache: &mut HashMap<Uuid, UserBrief>,
    user_id: Uuid,
) -> Result<UserBrief, ApiError> {
    if let Some(brief) = cache.get(&user_id) {
        return Ok(brief.clone());
    }
    let brief = match get_user_by_id(pool, user_id).await? {
        Some(user) => user.brief(),
        None => UserBrief {
            id: user_id,
            name: String::new(),
            email: String::new(),
            profile_image: String::new(),
        },
    };
    cache.insert(user_id, brief.clone());
    Ok(brief)
}

async fn hydrate_message(
    pool: &PgPool,
    cache: &mut HashMap<Uuid, UserBrief>,
    message: GroupMessage,
) -> Result<GroupMessageView, ApiError> {
    let sender = brief_for(pool, cache, message.sender_id).await?;
    Ok(GroupMessageView {
        id: message.id,
        group_id: message.group_id,
        sender: Some(sender),
        content: message.content,
        attachments: message.attachments,
        read_by: message.read_by,
        created_at: message.created_at,
    })
}

/// Full group projection. The hidden-sender list is only disclosed to the
/// group admin.
async fn group_view(pool: &PgPool, group: &Group, viewer_id: Uuid) -> Result<GroupView, ApiError> {
    let mut cache = HashMap::new();
    let admin = brief_for(pool, &mut cache, group.admin_id).await?;

    let mut members = Vec::new();
    for member_id in db::members_of(pool, group.id).await? {
        members.push(brief_for(pool, &mut cache, member_id).await?);
    }

    let hidden_member_ids = if group.admin_id == viewer_id {
        db::hidden_members(pool, group.id).await?
    } else {
        Vec::new()
    };

    Ok(GroupView {
        id: group.id,
        name: group.name.clone(),
        group_image: group.group_image.clone(),
        branch_id: group.branch_id,
        branch_name: group.branch_name.clone(),
        admin: Some(admin),
        members,
        hidden_member_ids,
        created_at: group.created_at,
        updated_at: group.updated_at,
    })
}

/// Create a group (POST /groups). The caller becomes admin and member.
pub async fn create_group(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Json(request): Json<CreateGroupRequest>,
) -> Result<Json<GroupResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;

    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("group name is required"));
    }

    let mut member_ids = request.members;
    member_ids.push(auth.user_id);
    member_ids.sort();
    member_ids.dedup();
    if member_ids.len() < MIN_GROUP_MEMBERS {
        return Err(ApiError::bad_request(
            "a group must have at least 2 members",
        ));
    }

    let branch = branches::db::resolve_or_create(
        pool,
        request.branch_id,
        request.branch_name.as_deref(),
    )
    .await?;

    let group = db::create_group(
        pool,
        name,
        auth.user_id,
        &member_ids,
        Some(branch.id),
        &branch.name,
    )
    .await
    .map_err(|e| {
        if branches::db::is_unique_violation(&e) {
            ApiError::bad_request("group name already exists")
        } else {
            e.into()
        }
    })?;

    tracing::info!("group {} created by {}", group.name, auth.user_id);

    let view = group_view(pool, &group, auth.user_id).await?;
    Ok(Json(GroupResponse {
        success: true,
        group: view,
    }))
}

/// Chats-screen listing (GET /groups): per group the newest visible
/// message and the caller's unread count.
pub async fn list_groups(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
) -> Result<Json<Vec<GroupSummary>>, ApiError> {
    let pool = require_pool(&state.db_pool)?;

    let groups = db::list_groups_for_user(pool, auth.user_id).await?;
    let mut cache = HashMap::new();
    let mut summaries = Vec::with_capacity(groups.len());

    for group in groups {
        let is_admin = group.admin_id == auth.user_id;
        let last_message =
            match db::last_visible_message(pool, group.id, auth.user_id, is_admin).await? {
                Some(message) => Some(hydrate_message(pool, &mut cache, message).await?),
                None => None,
            };
        let unread_count = db::group_unread_count(pool, group.id, auth.user_id).await?;

        summaries.push(GroupSummary {
            id: group.id,
            name: group.name,
            group_image: group.group_image,
            last_message,
            unread_count,
            updated_at: group.updated_at,
        });
    }

    Ok(Json(summaries))
}

/// Lightweight id/name listing (GET /groups/mine).
pub async fn my_groups(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
) -> Result<Json<Vec<GroupIdName>>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    let groups = db::list_group_names_for_user(pool, auth.user_id).await?;
    Ok(Json(
        groups
            .into_iter()
            .map(|(id, name)| GroupIdName { id, name })
            .collect(),
    ))
}

/// Group details (GET /groups/{id}).
pub async fn get_group(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(group_id): Path<Uuid>,
) -> Result<Json<GroupResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    let group = require_group(pool, group_id).await?;
    let view = group_view(pool, &group, auth.user_id).await?;
    Ok(Json(GroupResponse {
        success: true,
        group: view,
    }))
}

/// Group details plus the users of its branch (GET /groups/{id}/details),
/// used by the member picker.
pub async fn group_details(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(group_id): Path<Uuid>,
) -> Result<Json<GroupDetailsResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    let group = require_group(pool, group_id).await?;
    let view = group_view(pool, &group, auth.user_id).await?;

    let branch_users = match group.branch_id {
        Some(branch_id) => users::list_users_by_branch(pool, branch_id, None, 1000, 0)
            .await?
            .iter()
            .map(|u| u.public())
            .collect(),
        None => Vec::new(),
    };

    Ok(Json(GroupDetailsResponse {
        success: true,
        group: view,
        branch_users,
    }))
}

/// Rename and/or replace the group avatar (PATCH /groups/{id}, admin
/// only). Multipart: optional `name` field, optional `groupImage` file.
pub async fn update_group(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(group_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<GroupResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    let group = require_group(pool, group_id).await?;
    require_group_admin(&group, auth.user_id)?;

    let payload = upload::read_multipart(&mut multipart).await?;
    let name = payload
        .text("name")
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let mut new_image = None;
    if payload.files.iter().any(|f| f.field == "groupImage") {
        let storage = state
            .storage
            .as_ref()
            .ok_or(ApiError::ServiceUnavailable("object storage"))?;
        let stored = upload::store_all(storage, payload.files).await?;
        new_image = upload::find_upload(&stored, "groupImage").map(|u| u.url.clone());
    }

    if name.is_none() && new_image.is_none() {
        return Err(ApiError::bad_request("no data provided to update"));
    }

    let updated = db::update_group_details(pool, group_id, name.as_deref(), new_image.as_deref())
        .await
        .map_err(|e| {
            if branches::db::is_unique_violation(&e) {
                ApiError::bad_request("group name already exists")
            } else {
                ApiError::from(e)
            }
        })?
        .ok_or_else(|| ApiError::not_found("group not found"))?;

    if new_image.is_some() && !group.group_image.is_empty() {
        if let (Some(storage), Some(key)) =
            (&state.storage, S3Client::key_from_url(&group.group_image))
        {
            if let Err(e) = storage.delete_object(&key).await {
                tracing::warn!("could not delete old group image {}: {}", key, e);
            }
        }
    }

    let view = group_view(pool, &updated, auth.user_id).await?;
    Ok(Json(GroupResponse {
        success: true,
        group: view,
    }))
}

/// Toggle members in and out (PUT /groups/{id}/members, admin only).
///
/// The admin cannot be removed and membership may not drop below the
/// minimum.
pub async fn update_members(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(group_id): Path<Uuid>,
    Json(request): Json<UpdateMembersRequest>,
) -> Result<Json<GroupResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    let group = require_group(pool, group_id).await?;
    require_group_admin(&group, auth.user_id)?;

    if request.remove.contains(&group.admin_id) {
        return Err(ApiError::bad_request("the group admin cannot be removed"));
    }

    let current = db::members_of(pool, group_id).await?;
    let adding: Vec<Uuid> = request
        .add
        .iter()
        .filter(|id| !current.contains(id))
        .copied()
        .collect();
    let removing: Vec<Uuid> = request
        .remove
        .iter()
        .filter(|id| current.contains(id))
        .copied()
        .collect();

    let resulting = current.len() + adding.len() - removing.len();
    if resulting < MIN_GROUP_MEMBERS {
        return Err(ApiError::bad_request(
            "a group must keep at least 2 members",
        ));
    }

    for user_id in &adding {
        get_user_by_id(pool, *user_id)
            .await?
            .ok_or_else(|| ApiError::bad_request("unknown user in member list"))?;
        db::add_member(pool, group_id, *user_id).await?;
    }
    for user_id in &removing {
        db::remove_member(pool, group_id, *user_id).await?;
    }
    db::touch_group(pool, group_id, Utc::now()).await?;

    let view = group_view(pool, &group, auth.user_id).await?;
    Ok(Json(GroupResponse {
        success: true,
        group: view,
    }))
}

/// Add a single member (POST /groups/{id}/members, admin only).
pub async fn add_member(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(group_id): Path<Uuid>,
    Json(request): Json<AddMemberRequest>,
) -> Result<Json<GroupResponse>, ApiError> {
    update_members(
        State(state),
        AuthUser(auth),
        Path(group_id),
        Json(UpdateMembersRequest {
            add: vec![request.user_id],
            remove: Vec::new(),
        }),
    )
    .await
}

/// Remove a single member (DELETE /groups/{id}/members/{user_id}, admin
/// only).
pub async fn remove_member(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<GroupResponse>, ApiError> {
    update_members(
        State(state),
        AuthUser(auth),
        Path(group_id),
        Json(UpdateMembersRequest {
            add: Vec::new(),
            remove: vec![user_id],
        }),
    )
    .await
}

/// Transfer the admin role to a member (POST /groups/{id}/admin/{user_id},
/// admin only).
pub async fn make_admin(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    let group = require_group(pool, group_id).await?;
    require_group_admin(&group, auth.user_id)?;

    if !db::members_of(pool, group_id).await?.contains(&user_id) {
        return Err(ApiError::bad_request("new admin must be a group member"));
    }

    db::set_admin(pool, group_id, user_id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Hide or unhide a sender (PATCH /groups/{id}/members/{user_id}/hidden,
/// admin only).
pub async fn hide_member(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<HideMemberRequest>,
) -> Result<Json<GroupResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    let group = require_group(pool, group_id).await?;
    require_group_admin(&group, auth.user_id)?;

    db::set_member_hidden(pool, group_id, user_id, request.hide).await?;

    let view = group_view(pool, &group, auth.user_id).await?;
    Ok(Json(GroupResponse {
        success: true,
        group: view,
    }))
}

/// Delete a group and everything in it (DELETE /groups/{id}, admin only).
pub async fn delete_group(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(group_id): Path<Uuid>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    let group = require_group(pool, group_id).await?;
    require_group_admin(&group, auth.user_id)?;

    db::delete_group(pool, group_id).await?;
    tracing::info!("group {} deleted by {}", group_id, auth.user_id);
    Ok(Json(SuccessResponse { success: true }))
}

/// Send a group message (POST /groups/{id}/messages). Multipart like the
/// direct-chat send. The sender is pre-marked as having read it.
pub async fn send_group_message(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(group_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<SendGroupMessageResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    let group = require_group(pool, group_id).await?;
    require_membership(pool, &group, auth.user_id).await?;

    let payload = upload::read_multipart(&mut multipart).await?;
    let content = payload.text("content").unwrap_or_default().trim().to_string();

    let attachments = if payload.files.is_empty() {
        Vec::new()
    } else {
        let storage = state
            .storage
            .as_ref()
            .ok_or(ApiError::ServiceUnavailable("object storage"))?;
        upload::to_attachments(&upload::store_all(storage, payload.files).await?)
    };

    if crate::shared::messaging::message::is_blank(&content, &attachments) {
        return Err(ApiError::bad_request("empty message"));
    }

    let message = GroupMessage {
        id: Uuid::new_v4(),
        group_id,
        sender_id: auth.user_id,
        content,
        attachments,
        read_by: vec![auth.user_id],
        created_at: Utc::now(),
    };
    db::insert_group_message(pool, &message).await?;

    let mut cache = HashMap::new();
    let view = hydrate_message(pool, &mut cache, message).await?;

    state.rooms.broadcast(
        group_id,
        RealtimeEvent::new(
            EventKind::GroupMessage,
            serde_json::to_value(&view).unwrap_or_default(),
        ),
    );

    Ok(Json(SendGroupMessageResponse {
        success: true,
        message: view,
    }))
}

/// One page of group messages, newest first (GET /groups/{id}/messages),
/// filtered by the per-viewer visibility rules.
pub async fn list_group_messages(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(group_id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagesPage>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    let group = require_group(pool, group_id).await?;
    require_membership(pool, &group, auth.user_id).await?;

    let limit = query.limit.unwrap_or(40).clamp(1, 100);
    let is_admin = group.admin_id == auth.user_id;

    let messages =
        db::list_messages_page(pool, group_id, auth.user_id, is_admin, limit, query.before)
            .await?;
    let next_before = messages.last().map(|m| m.id);

    let mut cache = HashMap::new();
    let mut views = Vec::with_capacity(messages.len());
    for message in messages {
        views.push(hydrate_message(pool, &mut cache, message).await?);
    }

    Ok(Json(MessagesPage {
        success: true,
        messages: views,
        next_before,
    }))
}

/// Mark the whole group read for the caller (POST /groups/{id}/read).
pub async fn mark_group_read(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(group_id): Path<Uuid>,
) -> Result<Json<MarkGroupReadResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    let group = require_group(pool, group_id).await?;
    require_membership(pool, &group, auth.user_id).await?;

    let updated = db::mark_group_read(pool, group_id, auth.user_id).await?;
    if updated > 0 {
        state.rooms.broadcast(
            group_id,
            RealtimeEvent::new(
                EventKind::Read,
                serde_json::json!({
                    "group_id": group_id,
                    "reader_id": auth.user_id,
                    "updated": updated,
                }),
            ),
        );
    }

    Ok(Json(MarkGroupReadResponse {
        success: true,
        updated,
    }))
}

/// Admin hard delete (DELETE /groups/{id}/messages/{message_id}).
pub async fn delete_group_message(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path((group_id, message_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    let group = require_group(pool, group_id).await?;
    require_group_admin(&group, auth.user_id)?;

    if db::delete_message(pool, group_id, message_id).await? == 0 {
        return Err(ApiError::not_found("message not found"));
    }
    Ok(Json(SuccessResponse { success: true }))
}

/// Soft-delete for the caller only (DELETE
/// /groups/{id}/messages/{message_id}/for-me).
pub async fn delete_for_me(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path((group_id, message_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    let group = require_group(pool, group_id).await?;
    require_membership(pool, &group, auth.user_id).await?;

    db::get_group_message(pool, group_id, message_id)
        .await?
        .ok_or_else(|| ApiError::not_found("message not found"))?;

    db::delete_message_for_user(pool, message_id, auth.user_id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Remove for everyone (DELETE
/// /groups/{id}/messages/{message_id}/for-everyone): the sender or the
/// group admin may do this.
pub async fn delete_for_everyone(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path((group_id, message_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;
    let group = require_group(pool, group_id).await?;

    let message = db::get_group_message(pool, group_id, message_id)
        .await?
        .ok_or_else(|| ApiError::not_found("message not found"))?;

    let is_admin = group.admin_id == auth.user_id;
    let is_sender = message.sender_id == auth.user_id;
    if !is_admin && !is_sender {
        return Err(ApiError::forbidden("only the sender or the admin may do this"));
    }

    db::delete_message(pool, group_id, message_id).await?;
    Ok(Json(SuccessResponse { success: true }))
}
