//! Database operations for conversations and direct messages.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::shared::messaging::{Conversation, DirectMessage};

fn message_from_row(row: &PgRow) -> DirectMessage {
    let attachments: serde_json::Value = row.get("attachments");
    DirectMessage {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender_id: row.get("sender_id"),
        receiver_id: row.get("receiver_id"),
        content: row.get("content"),
        attachments: serde_json::from_value(attachments).unwrap_or_default(),
        is_read: row.get("is_read"),
        created_at: row.get("created_at"),
    }
}

/// Conversation between two users, regardless of who is `user_a`.
pub async fn find_conversation_between(
    pool: &PgPool,
    user_a: Uuid,
    user_b: Uuid,
) -> Result<Option<Conversation>, sqlx::Error> {
    sqlx::query_as::<_, Conversation>(
        r#"
        SELECT id, user_a, user_b, created_at, updated_at
        FROM conversations
        WHERE (user_a = $1 AND user_b = $2) OR (user_a = $2 AND user_b = $1)
        "#,
    )
    .bind(user_a)
    .bind(user_b)
    .fetch_optional(pool)
    .await
}

/// Look up a conversation by id.
pub async fn get_conversation(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<Conversation>, sqlx::Error> {
    sqlx::query_as::<_, Conversation>(
        r#"
        SELECT id, user_a, user_b, created_at, updated_at
        FROM conversations
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

async fn create_conversation(
    pool: &PgPool,
    user_a: Uuid,
    user_b: Uuid,
) -> Result<Conversation, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as::<_, Conversation>(
        r#"
        INSERT INTO conversations (id, user_a, user_b, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $4)
        RETURNING id, user_a, user_b, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_a)
    .bind(user_b)
    .bind(now)
    .fetch_one(pool)
    .await
}

/// Find the pair's conversation or create it. A concurrent create of the
/// same pair loses against the unique pair index and falls back to the
/// winner's row.
pub async fn find_or_create_conversation(
    pool: &PgPool,
    user_a: Uuid,
    user_b: Uuid,
) -> Result<Conversation, sqlx::Error> {
    if let Some(conversation) = find_conversation_between(pool, user_a, user_b).await? {
        return Ok(conversation);
    }
    match create_conversation(pool, user_a, user_b).await {
        Ok(conversation) => Ok(conversation),
        Err(e) if crate::backend::branches::db::is_unique_violation(&e) => {
            find_conversation_between(pool, user_a, user_b)
                .await?
                .ok_or(sqlx::Error::RowNotFound)
        }
        Err(e) => Err(e),
    }
}

/// Bump a conversation's activity timestamp.
pub async fn touch_conversation(
    pool: &PgPool,
    id: Uuid,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE conversations SET updated_at = $2 WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Store a direct message and bump the conversation.
pub async fn insert_message(pool: &PgPool, message: &DirectMessage) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO direct_messages
            (id, conversation_id, sender_id, receiver_id, content, attachments, is_read, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(message.id)
    .bind(message.conversation_id)
    .bind(message.sender_id)
    .bind(message.receiver_id)
    .bind(&message.content)
    .bind(serde_json::to_value(&message.attachments).unwrap_or_else(|_| serde_json::json!([])))
    .bind(message.is_read)
    .bind(message.created_at)
    .execute(pool)
    .await?;

    touch_conversation(pool, message.conversation_id, message.created_at).await
}

/// Messages of a conversation, oldest first.
pub async fn list_messages(
    pool: &PgPool,
    conversation_id: Uuid,
) -> Result<Vec<DirectMessage>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, conversation_id, sender_id, receiver_id, content, attachments, is_read, created_at
        FROM direct_messages
        WHERE conversation_id = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(message_from_row).collect())
}

/// Newest message of a conversation.
pub async fn last_message(
    pool: &PgPool,
    conversation_id: Uuid,
) -> Result<Option<DirectMessage>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, conversation_id, sender_id, receiver_id, content, attachments, is_read, created_at
        FROM direct_messages
        WHERE conversation_id = $1
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(conversation_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(message_from_row))
}

/// Mark every unread message addressed to `reader_id` as read. The filter
/// makes the update idempotent: a replay matches no rows. Returns how many
/// rows flipped.
pub async fn mark_conversation_read(
    pool: &PgPool,
    conversation_id: Uuid,
    reader_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE direct_messages
        SET is_read = TRUE
        WHERE conversation_id = $1 AND receiver_id = $2 AND NOT is_read
        "#,
    )
    .bind(conversation_id)
    .bind(reader_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Unread messages in a conversation from the viewer's perspective: not
/// read and not sent by them.
pub async fn unread_count(
    pool: &PgPool,
    conversation_id: Uuid,
    viewer_id: Uuid,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS count
        FROM direct_messages
        WHERE conversation_id = $1 AND NOT is_read AND sender_id <> $2
        "#,
    )
    .bind(conversation_id)
    .bind(viewer_id)
    .fetch_one(pool)
    .await?;
    Ok(row.get("count"))
}

/// Conversations of a user, most recently active first.
pub async fn list_conversations_for_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<Conversation>, sqlx::Error> {
    sqlx::query_as::<_, Conversation>(
        r#"
        SELECT id, user_a, user_b, created_at, updated_at
        FROM conversations
        WHERE user_a = $1 OR user_b = $1
        ORDER BY updated_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}
