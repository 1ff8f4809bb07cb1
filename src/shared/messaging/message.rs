//! Direct messages and attachments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::user::UserBrief;

/// A file attached to a message or payment, already uploaded to object
/// storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Public URL of the stored object
    pub url: String,
    /// Original file name
    pub name: Option<String>,
    /// MIME type reported at upload time
    pub content_type: Option<String>,
    /// Size in bytes
    pub size: Option<i64>,
}

/// A message inside a two-party conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub attachments: Vec<Attachment>,
    /// Receiver-side read flag
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A message must carry text or at least one attachment.
pub fn is_blank(content: &str, attachments: &[Attachment]) -> bool {
    content.trim().is_empty() && attachments.is_empty()
}

/// Direct message hydrated with sender/receiver projections for API
/// responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectMessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: UserBrief,
    pub receiver: UserBrief,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_message_detection() {
        assert!(is_blank("", &[]));
        assert!(is_blank("   ", &[]));
        assert!(!is_blank("hi", &[]));

        let attachment = Attachment {
            url: "https://cdn.example.com/chats/images/a.png".to_string(),
            name: Some("a.png".to_string()),
            content_type: Some("image/png".to_string()),
            size: Some(42),
        };
        assert!(!is_blank("", &[attachment]));
    }
}
