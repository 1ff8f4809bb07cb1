//! Two-party conversations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::messaging::message::Attachment;
use crate::shared::user::UserBrief;

/// A conversation between exactly two distinct users
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub user_a: Uuid,
    pub user_b: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    /// The counterpart of `user_id`, when they participate at all.
    pub fn other_of(&self, user_id: Uuid) -> Option<Uuid> {
        if self.user_a == user_id {
            Some(self.user_b)
        } else if self.user_b == user_id {
            Some(self.user_a)
        } else {
            None
        }
    }
}

/// Preview of the newest message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessage {
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub sender_id: Uuid,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Chats-screen entry: the other participant, the newest message and the
/// viewer's unread count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub other_user: UserBrief,
    pub last_message: Option<LastMessage>,
    pub unread_count: i64,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_of() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_a: a,
            user_b: b,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(conversation.other_of(a), Some(b));
        assert_eq!(conversation.other_of(b), Some(a));
        assert_eq!(conversation.other_of(Uuid::new_v4()), None);
        assert!(conversation.involves(a));
        assert!(!conversation.involves(Uuid::new_v4()));
    }
}
