//! Realtime event envelope broadcast to SSE subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kinds of realtime events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new direct message in a conversation
    DirectMessage,
    /// A new message in a group
    GroupMessage,
    /// Messages were marked read
    Read,
    /// A user came online or went offline
    Presence,
}

impl EventKind {
    /// SSE `event:` name for this kind.
    pub fn sse_name(&self) -> &'static str {
        match self {
            Self::DirectMessage => "direct_message",
            Self::GroupMessage => "group_message",
            Self::Read => "read",
            Self::Presence => "presence",
        }
    }
}

/// Event envelope: kind, serialized payload and emission time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl RealtimeEvent {
    pub fn new(kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            payload,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = RealtimeEvent::new(
            EventKind::GroupMessage,
            serde_json::json!({"content": "hello"}),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "group_message");
        assert_eq!(json["payload"]["content"], "hello");
    }

    #[test]
    fn test_sse_names() {
        assert_eq!(EventKind::DirectMessage.sse_name(), "direct_message");
        assert_eq!(EventKind::Presence.sse_name(), "presence");
    }
}
