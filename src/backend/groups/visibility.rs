//! Per-viewer visibility rules for group messages.
//!
//! A message is visible to a viewer unless:
//!
//! 1. the viewer soft-deleted it ("delete for me"), or
//! 2. the viewer is not the group admin, the sender is on the group's
//!    hidden list, and the message is not the viewer's own.
//!
//! The admin sees everything they have not deleted for themselves. The
//! same rules gate both the HTTP listing (in SQL, for pagination) and the
//! live SSE fan-out (here, per subscriber).

use std::collections::HashSet;

use uuid::Uuid;

use crate::shared::{EventKind, RealtimeEvent};

/// Who is looking at a group
#[derive(Debug, Clone, Copy)]
pub struct ViewerContext {
    pub viewer_id: Uuid,
    pub is_admin: bool,
}

/// Core visibility predicate.
pub fn message_visible(
    ctx: &ViewerContext,
    sender_id: Uuid,
    hidden_members: &HashSet<Uuid>,
    deleted_for: &HashSet<Uuid>,
) -> bool {
    if deleted_for.contains(&ctx.viewer_id) {
        return false;
    }
    if ctx.is_admin || sender_id == ctx.viewer_id {
        return true;
    }
    !hidden_members.contains(&sender_id)
}

/// Sender id carried in a group-message event payload.
pub fn event_sender(event: &RealtimeEvent) -> Option<Uuid> {
    let id = event.payload.get("sender")?.get("id")?;
    serde_json::from_value(id.clone()).ok()
}

/// Whether a live event may be delivered to a subscriber. Non-message
/// events (reads, presence) always pass; group messages pass the
/// visibility predicate. Freshly sent messages have no per-viewer
/// deletions yet, so only the hidden-sender rule applies.
pub fn event_visible(
    ctx: &ViewerContext,
    event: &RealtimeEvent,
    hidden_members: &HashSet<Uuid>,
) -> bool {
    if event.kind != EventKind::GroupMessage {
        return true;
    }
    match event_sender(event) {
        Some(sender_id) => message_visible(ctx, sender_id, hidden_members, &HashSet::new()),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (Uuid, Uuid, Uuid) {
        (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn test_plain_member_sees_plain_sender() {
        let (viewer, sender, _) = ids();
        let ctx = ViewerContext {
            viewer_id: viewer,
            is_admin: false,
        };
        assert!(message_visible(&ctx, sender, &HashSet::new(), &HashSet::new()));
    }

    #[test]
    fn test_hidden_sender_is_invisible_to_members() {
        let (viewer, hidden_sender, _) = ids();
        let ctx = ViewerContext {
            viewer_id: viewer,
            is_admin: false,
        };
        let hidden = HashSet::from([hidden_sender]);
        assert!(!message_visible(&ctx, hidden_sender, &hidden, &HashSet::new()));
    }

    #[test]
    fn test_admin_sees_hidden_senders() {
        let (admin, hidden_sender, _) = ids();
        let ctx = ViewerContext {
            viewer_id: admin,
            is_admin: true,
        };
        let hidden = HashSet::from([hidden_sender]);
        assert!(message_visible(&ctx, hidden_sender, &hidden, &HashSet::new()));
    }

    #[test]
    fn test_hidden_sender_still_sees_own_messages() {
        let (hidden_sender, _, _) = ids();
        let ctx = ViewerContext {
            viewer_id: hidden_sender,
            is_admin: false,
        };
        let hidden = HashSet::from([hidden_sender]);
        assert!(message_visible(&ctx, hidden_sender, &hidden, &HashSet::new()));
    }

    #[test]
    fn test_delete_for_me_beats_everything() {
        let (viewer, sender, _) = ids();
        let deleted = HashSet::from([viewer]);

        let member = ViewerContext {
            viewer_id: viewer,
            is_admin: false,
        };
        assert!(!message_visible(&member, sender, &HashSet::new(), &deleted));

        // Even the admin does not see what they deleted for themselves.
        let admin = ViewerContext {
            viewer_id: viewer,
            is_admin: true,
        };
        assert!(!message_visible(&admin, sender, &HashSet::new(), &deleted));

        // Other viewers are unaffected.
        let other = ViewerContext {
            viewer_id: Uuid::new_v4(),
            is_admin: false,
        };
        assert!(message_visible(&other, sender, &HashSet::new(), &deleted));
    }

    #[test]
    fn test_event_sender_extraction() {
        let sender_id = Uuid::new_v4();
        let event = RealtimeEvent::new(
            EventKind::GroupMessage,
            serde_json::json!({"sender": {"id": sender_id, "name": "A"}, "content": "hi"}),
        );
        assert_eq!(event_sender(&event), Some(sender_id));

        let empty = RealtimeEvent::new(EventKind::GroupMessage, serde_json::json!({}));
        assert_eq!(event_sender(&empty), None);
    }

    #[test]
    fn test_event_visibility_filters_hidden_senders_only() {
        let (viewer, hidden_sender, other_sender) = ids();
        let ctx = ViewerContext {
            viewer_id: viewer,
            is_admin: false,
        };
        let hidden = HashSet::from([hidden_sender]);

        let from_hidden = RealtimeEvent::new(
            EventKind::GroupMessage,
            serde_json::json!({"sender": {"id": hidden_sender}}),
        );
        let from_other = RealtimeEvent::new(
            EventKind::GroupMessage,
            serde_json::json!({"sender": {"id": other_sender}}),
        );
        let read_event = RealtimeEvent::new(EventKind::Read, serde_json::json!({}));

        assert!(!event_visible(&ctx, &from_hidden, &hidden));
        assert!(event_visible(&ctx, &from_other, &hidden));
        assert!(event_visible(&ctx, &read_event, &hidden));
    }
}
