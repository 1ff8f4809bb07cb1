//! HTTP handlers for direct messaging.
//!
//! Sending and marking-read run through the same database operations the
//! SSE path observes, so both entry points share one semantics: a message
//! insert bumps the conversation and fans out a `direct_message` event; a
//! mark-read flips only unread rows addressed to the reader and fans out a
//! `read` event when anything changed.

use std::collections::HashMap;

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::backend::auth::users::get_user_by_id;
use crate::backend::chat::db;
use crate::backend::error::ApiError;
use crate::backend::middleware::auth::AuthUser;
use crate::backend::server::state::AppState;
use crate::backend::storage::upload;
use crate::shared::messaging::{
    Conversation, ConversationSummary, DirectMessage, DirectMessageView, LastMessage,
};
use crate::shared::user::UserBrief;
use crate::shared::{EventKind, RealtimeEvent};

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub success: bool,
    pub conversation: Conversation,
    pub message: DirectMessageView,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub success: bool,
    pub updated: u64,
}

fn require_pool(pool: &Option<PgPool>) -> Result<&PgPool, ApiError> {
    pool.as_ref().ok_or(ApiError::ServiceUnavailable("database"))
}

/// Sender/receiver projection with a single fetch per distinct user.
/// Deleted accounts degrade to an empty projection instead of failing the
/// listing.
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

async fn hydrate(
    pool: &PgPool,
    cache: &mut HashMap<Uuid, UserBrief>,
    message: DirectMessage,
) -> Result<DirectMessageView, ApiError> {
    let sender = brief_for(pool, cache, message.sender_id).await?;
    let receiver = brief_for(pool, cache, message.receiver_id).await?;
    Ok(DirectMessageView {
        id: message.id,
        conversation_id: message.conversation_id,
        sender,
        receiver,
        content: message.content,
        attachments: message.attachments,
        is_read: message.is_read,
        created_at: message.created_at,
    })
}

/// Send a direct message (POST /chats/{peer_id}).
///
/// Multipart body: `content` text field plus chat files. The pair's
/// conversation is created on first contact.
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(peer_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;

    if peer_id == auth.user_id {
        return Err(ApiError::bad_request(
            "a conversation must be between two different users",
        ));
    }
    get_user_by_id(pool, peer_id)
        .await?
        .ok_or_else(|| ApiError::not_found("receiver not found"))?;

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
        return Err(ApiError::bad_request(
            "message must contain text or a file",
        ));
    }

    let conversation = db::find_or_create_conversation(pool, auth.user_id, peer_id).await?;

    let message = DirectMessage {
        id: Uuid::new_v4(),
        conversation_id: conversation.id,
        sender_id: auth.user_id,
        receiver_id: peer_id,
        content,
        attachments,
        is_read: false,
        created_at: Utc::now(),
    };
    db::insert_message(pool, &message).await?;

    let mut cache = HashMap::new();
    let view = hydrate(pool, &mut cache, message).await?;

    state.rooms.broadcast(
        conversation.id,
        RealtimeEvent::new(
            EventKind::DirectMessage,
            serde_json::to_value(&view).unwrap_or_default(),
        ),
    );

    Ok(Json(SendMessageResponse {
        success: true,
        conversation,
        message: view,
    }))
}

/// Messages with a peer, oldest first (GET /chats/{peer_id}).
///
/// Reading a chat is the read receipt: every unread message addressed to
/// the caller flips to read, and a `read` event goes out when any did.
pub async fn get_chats(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(peer_id): Path<Uuid>,
) -> Result<Json<Vec<DirectMessageView>>, ApiError> {
    let pool = require_pool(&state.db_pool)?;

    let Some(conversation) = db::find_conversation_between(pool, auth.user_id, peer_id).await?
    else {
        return Ok(Json(Vec::new()));
    };

    let messages = db::list_messages(pool, conversation.id).await?;

    let updated = db::mark_conversation_read(pool, conversation.id, auth.user_id).await?;
    if updated > 0 {
        state.rooms.broadcast(
            conversation.id,
            RealtimeEvent::new(
                EventKind::Read,
                serde_json::json!({
                    "conversation_id": conversation.id,
                    "reader_id": auth.user_id,
                    "updated": updated,
                }),
            ),
        );
    }

    let mut cache = HashMap::new();
    let mut views = Vec::with_capacity(messages.len());
    for mut message in messages {
        // Reflect the mark-read this request just performed.
        if message.receiver_id == auth.user_id {
            message.is_read = true;
        }
        views.push(hydrate(pool, &mut cache, message).await?);
    }

    Ok(Json(views))
}

/// Chats-screen listing (GET /conversations): other user, newest message
/// and unread count per conversation, most recently active first.
pub async fn list_conversations(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let pool = require_pool(&state.db_pool)?;

    let conversations = db::list_conversations_for_user(pool, auth.user_id).await?;
    let mut cache = HashMap::new();
    let mut summaries = Vec::with_capacity(conversations.len());

    for conversation in conversations {
        let Some(other_id) = conversation.other_of(auth.user_id) else {
            continue;
        };
        let other_user = brief_for(pool, &mut cache, other_id).await?;

        let last_message = db::last_message(pool, conversation.id)
            .await?
            .map(|m| LastMessage {
                content: m.content,
                attachments: m.attachments,
                sender_id: m.sender_id,
                is_read: m.is_read,
                created_at: m.created_at,
            });
        let unread_count = db::unread_count(pool, conversation.id, auth.user_id).await?;

        summaries.push(ConversationSummary {
            id: conversation.id,
            other_user,
            last_message,
            unread_count,
            updated_at: conversation.updated_at,
        });
    }

    Ok(Json(summaries))
}

/// Explicit mark-read (POST /conversations/{id}/read), the HTTP equivalent
/// of opening the chat.
pub async fn mark_conversation_read(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let pool = require_pool(&state.db_pool)?;

    let conversation = db::get_conversation(pool, conversation_id)
        .await?
        .ok_or_else(|| ApiError::not_found("conversation not found"))?;
    if !conversation.involves(auth.user_id) {
        return Err(ApiError::forbidden("not a participant"));
    }

    let updated = db::mark_conversation_read(pool, conversation_id, auth.user_id).await?;
    if updated > 0 {
        state.rooms.broadcast(
            conversation_id,
            RealtimeEvent::new(
                EventKind::Read,
                serde_json::json!({
                    "conversation_id": conversation_id,
                    "reader_id": auth.user_id,
                    "updated": updated,
                }),
            ),
        );
    }

    Ok(Json(MarkReadResponse {
        success: true,
        updated,
    }))
}
