//! Database operations for groups and group messages.
//!
//! Read receipts are a `(message_id, user_id)` table written with
//! `ON CONFLICT DO NOTHING`, so marking a group read is idempotent under
//! concurrent replays. Visibility (hidden senders, delete-for-me) is
//! applied inside the listing queries so cursor pagination stays correct.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::shared::messaging::{Group, GroupMessage};

const GROUP_COLUMNS: &str =
    "id, name, admin_id, branch_id, branch_name, group_image, active, created_at, updated_at";

const MESSAGE_SELECT: &str = r#"
    SELECT m.id, m.group_id, m.sender_id, m.content, m.attachments, m.created_at,
           COALESCE(ARRAY_AGG(r.user_id) FILTER (WHERE r.user_id IS NOT NULL),
                    ARRAY[]::uuid[]) AS read_by
    FROM group_messages m
    LEFT JOIN group_read_receipts r ON r.message_id = m.id
"#;

fn message_from_row(row: &PgRow) -> GroupMessage {
    let attachments: serde_json::Value = row.get("attachments");
    GroupMessage {
        id: row.get("id"),
        group_id: row.get("group_id"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        attachments: serde_json::from_value(attachments).unwrap_or_default(),
        read_by: row.get("read_by"),
        created_at: row.get("created_at"),
    }
}

/// Create a group with its member set (the admin is always a member).
pub async fn create_group(
    pool: &PgPool,
    name: &str,
    admin_id: Uuid,
    member_ids: &[Uuid],
    branch_id: Option<Uuid>,
    branch_name: &str,
) -> Result<Group, sqlx::Error> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let query = format!(
        r#"
        INSERT INTO groups (id, name, admin_id, branch_id, branch_name, group_image, active,
                            created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, '', TRUE, $6, $6)
        RETURNING {GROUP_COLUMNS}
        "#
    );
    let group = sqlx::query_as::<_, Group>(&query)
        .bind(Uuid::new_v4())
        .bind(name.trim())
        .bind(admin_id)
        .bind(branch_id)
        .bind(branch_name)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

    for member_id in member_ids {
        sqlx::query(
            r#"
            INSERT INTO group_members (group_id, user_id, joined_at)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(group.id)
        .bind(member_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(group)
}

/// Look up a group by id.
pub async fn get_group(pool: &PgPool, id: Uuid) -> Result<Option<Group>, sqlx::Error> {
    let query = format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = $1");
    sqlx::query_as::<_, Group>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Groups the user admins or belongs to, most recently active first.
pub async fn list_groups_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Group>, sqlx::Error> {
    let query = format!(
        r#"
        SELECT {GROUP_COLUMNS} FROM groups g
        WHERE g.admin_id = $1
           OR EXISTS (SELECT 1 FROM group_members gm
                      WHERE gm.group_id = g.id AND gm.user_id = $1)
        ORDER BY g.updated_at DESC
        "#
    );
    sqlx::query_as::<_, Group>(&query)
        .bind(user_id)
        .fetch_all(pool)
        .await
}

/// Lightweight id/name listing for pickers.
pub async fn list_group_names_for_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<(Uuid, String)>, sqlx::Error> {
    sqlx::query_as::<_, (Uuid, String)>(
        r#"
        SELECT g.id, g.name FROM groups g
        WHERE g.admin_id = $1
           OR EXISTS (SELECT 1 FROM group_members gm
                      WHERE gm.group_id = g.id AND gm.user_id = $1)
        ORDER BY g.name ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Rename and/or replace the avatar.
pub async fn update_group_details(
    pool: &PgPool,
    id: Uuid,
    name: Option<&str>,
    group_image: Option<&str>,
) -> Result<Option<Group>, sqlx::Error> {
    let query = format!(
        r#"
        UPDATE groups SET
            name = COALESCE($2, name),
            group_image = COALESCE($3, group_image),
            updated_at = $4
        WHERE id = $1
        RETURNING {GROUP_COLUMNS}
        "#
    );
    sqlx::query_as::<_, Group>(&query)
        .bind(id)
        .bind(name)
        .bind(group_image)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
}

/// Bump a group's activity timestamp.
pub async fn touch_group(pool: &PgPool, id: Uuid, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE groups SET updated_at = $2 WHERE id = $1")
        .bind(id)
        .bind(at)
        .execute(pool)
        .await?;
    Ok(())
}

/// Member ids of a group.
pub async fn members_of(pool: &PgPool, group_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT user_id FROM group_members WHERE group_id = $1 ORDER BY joined_at ASC
        "#,
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(|r| r.get("user_id")).collect())
}

/// Whether a user may read/write a group (member or admin).
pub async fn is_member(pool: &PgPool, group_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM groups g WHERE g.id = $1 AND g.admin_id = $2
            UNION ALL
            SELECT 1 FROM group_members gm WHERE gm.group_id = $1 AND gm.user_id = $2
        ) AS is_member
        "#,
    )
    .bind(group_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(row.get("is_member"))
}

pub async fn member_count(pool: &PgPool, group_id: Uuid) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM group_members WHERE group_id = $1")
        .bind(group_id)
        .fetch_one(pool)
        .await?;
    Ok(row.get("count"))
}

/// Add a member (idempotent).
pub async fn add_member(pool: &PgPool, group_id: Uuid, user_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO group_members (group_id, user_id, joined_at)
        VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(group_id)
    .bind(user_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Remove a member.
pub async fn remove_member(
    pool: &PgPool,
    group_id: Uuid,
    user_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM group_members WHERE group_id = $1 AND user_id = $2")
        .bind(group_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Transfer the admin role. The new admin must already be a member; the old
/// admin stays one.
pub async fn set_admin(pool: &PgPool, group_id: Uuid, user_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE groups SET admin_id = $2, updated_at = $3 WHERE id = $1")
        .bind(group_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(pool)
        .await?;
    Ok(())
}

/// Toggle a sender's hidden flag.
pub async fn set_member_hidden(
    pool: &PgPool,
    group_id: Uuid,
    user_id: Uuid,
    hide: bool,
) -> Result<(), sqlx::Error> {
    if hide {
        sqlx::query(
            r#"
            INSERT INTO group_hidden_members (group_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    } else {
        sqlx::query("DELETE FROM group_hidden_members WHERE group_id = $1 AND user_id = $2")
            .bind(group_id)
            .bind(user_id)
            .execute(pool)
            .await?;
    }
    Ok(())
}

/// Hidden sender ids of a group.
pub async fn hidden_members(pool: &PgPool, group_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
    let rows = sqlx::query("SELECT user_id FROM group_hidden_members WHERE group_id = $1")
        .bind(group_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(|r| r.get("user_id")).collect())
}

/// Delete a group. Messages, receipts, deletions and membership cascade.
pub async fn delete_group(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM groups WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Store a group message. The sender counts as having read it, and the
/// group's activity timestamp moves.
pub async fn insert_group_message(
    pool: &PgPool,
    message: &GroupMessage,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO group_messages (id, group_id, sender_id, content, attachments, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(message.id)
    .bind(message.group_id)
    .bind(message.sender_id)
    .bind(&message.content)
    .bind(serde_json::to_value(&message.attachments).unwrap_or_else(|_| serde_json::json!([])))
    .bind(message.created_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO group_read_receipts (message_id, user_id, read_at)
        VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(message.id)
    .bind(message.sender_id)
    .bind(message.created_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE groups SET updated_at = $2 WHERE id = $1")
        .bind(message.group_id)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

    tx.commit().await
}

/// One message of a group, with its read set.
pub async fn get_group_message(
    pool: &PgPool,
    group_id: Uuid,
    message_id: Uuid,
) -> Result<Option<GroupMessage>, sqlx::Error> {
    let query = format!(
        "{MESSAGE_SELECT}
        WHERE m.group_id = $1 AND m.id = $2
        GROUP BY m.id"
    );
    let row = sqlx::query(&query)
        .bind(group_id)
        .bind(message_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(message_from_row))
}

/// One page of a group's messages as seen by `viewer`, newest first.
///
/// Visibility: rows the viewer deleted for themselves are excluded; unless
/// the viewer is the admin, rows from hidden senders are excluded too,
/// except the viewer's own. `before` is a message-id cursor.
pub async fn list_messages_page(
    pool: &PgPool,
    group_id: Uuid,
    viewer_id: Uuid,
    viewer_is_admin: bool,
    limit: i64,
    before: Option<Uuid>,
) -> Result<Vec<GroupMessage>, sqlx::Error> {
    let query = format!(
        "{MESSAGE_SELECT}
        WHERE m.group_id = $1
          AND NOT EXISTS (SELECT 1 FROM group_message_deletions d
                          WHERE d.message_id = m.id AND d.user_id = $2)
          AND ($3 OR m.sender_id = $2 OR NOT EXISTS (
                SELECT 1 FROM group_hidden_members h
                WHERE h.group_id = m.group_id AND h.user_id = m.sender_id))
          AND ($4::uuid IS NULL OR m.created_at < (
                SELECT created_at FROM group_messages WHERE id = $4))
        GROUP BY m.id
        ORDER BY m.created_at DESC
        LIMIT $5"
    );
    let rows = sqlx::query(&query)
        .bind(group_id)
        .bind(viewer_id)
        .bind(viewer_is_admin)
        .bind(before)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(message_from_row).collect())
}

/// Newest message visible to `viewer` (for the chats-screen preview).
pub async fn last_visible_message(
    pool: &PgPool,
    group_id: Uuid,
    viewer_id: Uuid,
    viewer_is_admin: bool,
) -> Result<Option<GroupMessage>, sqlx::Error> {
    Ok(
        list_messages_page(pool, group_id, viewer_id, viewer_is_admin, 1, None)
            .await?
            .into_iter()
            .next(),
    )
}

/// Add the reader to the read set of every message of the group they have
/// not read yet. Set semantics make replays no-ops. Returns the number of
/// fresh receipts.
pub async fn mark_group_read(
    pool: &PgPool,
    group_id: Uuid,
    reader_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO group_read_receipts (message_id, user_id, read_at)
        SELECT m.id, $2, $3
        FROM group_messages m
        WHERE m.group_id = $1
          AND NOT EXISTS (SELECT 1 FROM group_read_receipts r
                          WHERE r.message_id = m.id AND r.user_id = $2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(group_id)
    .bind(reader_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Unread messages from the viewer's perspective: someone else's message
/// whose read set does not contain them.
pub async fn group_unread_count(
    pool: &PgPool,
    group_id: Uuid,
    viewer_id: Uuid,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS count
        FROM group_messages m
        WHERE m.group_id = $1
          AND m.sender_id <> $2
          AND NOT EXISTS (SELECT 1 FROM group_read_receipts r
                          WHERE r.message_id = m.id AND r.user_id = $2)
        "#,
    )
    .bind(group_id)
    .bind(viewer_id)
    .fetch_one(pool)
    .await?;
    Ok(row.get("count"))
}

/// Hard-delete a message (admin delete / delete-for-everyone).
pub async fn delete_message(
    pool: &PgPool,
    group_id: Uuid,
    message_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM group_messages WHERE id = $1 AND group_id = $2")
        .bind(message_id)
        .bind(group_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Soft-delete a message for one viewer (idempotent).
pub async fn delete_message_for_user(
    pool: &PgPool,
    message_id: Uuid,
    user_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO group_message_deletions (message_id, user_id, deleted_at)
        VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(message_id)
    .bind(user_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}
