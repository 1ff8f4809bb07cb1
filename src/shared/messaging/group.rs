//! Group conversations and group messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::messaging::message::Attachment;
use crate::shared::user::UserBrief;

/// A group must never drop below this many members.
pub const MIN_GROUP_MEMBERS: usize = 2;

/// Group conversation record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub id: Uuid,
    /// Group name (unique)
    pub name: String,
    pub admin_id: Uuid,
    pub branch_id: Option<Uuid>,
    pub branch_name: String,
    /// Public URL of the group avatar, empty when unset
    pub group_image: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A message inside a group conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMessage {
    pub id: Uuid,
    pub group_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub attachments: Vec<Attachment>,
    /// Users who have read this message; the sender is included on creation
    pub read_by: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Group message hydrated with the sender projection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMessageView {
    pub id: Uuid,
    pub group_id: Uuid,
    pub sender: Option<UserBrief>,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub read_by: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Full group details: hydrated admin and member projections plus the
/// hidden-sender list (only meaningful to the admin).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupView {
    pub id: Uuid,
    pub name: String,
    pub group_image: String,
    pub branch_id: Option<Uuid>,
    pub branch_name: String,
    pub admin: Option<UserBrief>,
    pub members: Vec<UserBrief>,
    pub hidden_member_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Chats-screen entry for a group: newest visible message and the viewer's
/// unread count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSummary {
    pub id: Uuid,
    pub name: String,
    pub group_image: String,
    pub last_message: Option<GroupMessageView>,
    pub unread_count: i64,
    pub updated_at: DateTime<Utc>,
}
