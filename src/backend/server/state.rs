//! Application state.
//!
//! `AppState` is the central state container shared by all handlers:
//! the optional database pool, the per-room broadcast registry, the presence
//! registry, the global event channel and the optional outbound clients
//! (object storage, mail, push). `FromRef` implementations let handlers
//! extract just the part they need.
//!
//! All of it is cheap to clone and safe to share: pools and senders are
//! reference-counted internally, and the room registry is a mutex-guarded
//! map of channel senders.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::FromRef;
use sqlx::PgPool;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::backend::mail::Mailer;
use crate::backend::notifications::fcm::FcmClient;
use crate::backend::realtime::broadcast::RealtimeEventBroadcast;
use crate::backend::realtime::presence::PresenceRegistry;
use crate::backend::storage::s3::S3Client;
use crate::shared::RealtimeEvent;

/// Per-room broadcast channels for real-time message delivery.
///
/// Each conversation or group gets its own channel, created on demand, so
/// events never leak across rooms. Channels with no remaining subscribers
/// are dropped by the periodic cleanup task.
#[derive(Clone, Default)]
pub struct RoomBroadcastState {
    channels: Arc<Mutex<HashMap<Uuid, broadcast::Sender<RealtimeEvent>>>>,
}

impl RoomBroadcastState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the broadcast sender for a room.
    pub fn sender(&self, room_id: Uuid) -> broadcast::Sender<RealtimeEvent> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(100).0)
            .clone()
    }

    /// Broadcast an event to a room's subscribers. A room with no channel or
    /// no receivers drops the event.
    pub fn broadcast(&self, room_id: Uuid, event: RealtimeEvent) -> usize {
        let sender = {
            let channels = self.channels.lock().unwrap();
            channels.get(&room_id).cloned()
        };
        match sender {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Drop channels with no subscribers.
    pub fn cleanup_inactive(&self) {
        self.channels
            .lock()
            .unwrap()
            .retain(|_, sender| sender.receiver_count() > 0);
    }

    /// Subscriber count for a room.
    pub fn subscriber_count(&self, room_id: Uuid) -> usize {
        self.channels
            .lock()
            .unwrap()
            .get(&room_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

/// Central application state
#[derive(Clone)]
pub struct AppState {
    /// Database pool; `None` when `DATABASE_URL` is not configured.
    /// Handlers answer 503 in that case.
    pub db_pool: Option<PgPool>,

    /// Per-conversation/group broadcast channels for SSE delivery
    pub rooms: RoomBroadcastState,

    /// Connection-counted online users
    pub presence: PresenceRegistry,

    /// Global event channel (presence transitions and other cross-room
    /// events)
    pub events: RealtimeEventBroadcast,

    /// Object storage client; `None` disables upload-bearing endpoints
    pub storage: Option<S3Client>,

    /// SMTP mailer; `None` disables outbound mail
    pub mailer: Option<Mailer>,

    /// FCM client; `None` disables push delivery
    pub push: Option<FcmClient>,
}

impl FromRef<AppState> for Option<PgPool> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.db_pool.clone()
    }
}

impl FromRef<AppState> for RoomBroadcastState {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.rooms.clone()
    }
}

impl FromRef<AppState> for PresenceRegistry {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.presence.clone()
    }
}

impl FromRef<AppState> for RealtimeEventBroadcast {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.events.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::EventKind;

    #[tokio::test]
    async fn test_room_channels_are_isolated() {
        let rooms = RoomBroadcastState::new();
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();

        let mut rx_a = rooms.sender(room_a).subscribe();
        let _rx_b = rooms.sender(room_b).subscribe();

        let event = RealtimeEvent::new(EventKind::GroupMessage, serde_json::json!({"n": 1}));
        assert_eq!(rooms.broadcast(room_a, event), 1);

        let received = rx_a.recv().await.unwrap();
        assert_eq!(received.payload["n"], 1);
    }

    #[tokio::test]
    async fn test_broadcast_without_channel_is_dropped() {
        let rooms = RoomBroadcastState::new();
        let event = RealtimeEvent::new(EventKind::DirectMessage, serde_json::json!({}));
        assert_eq!(rooms.broadcast(Uuid::new_v4(), event), 0);
    }

    #[tokio::test]
    async fn test_cleanup_drops_idle_channels() {
        let rooms = RoomBroadcastState::new();
        let active = Uuid::new_v4();
        let idle = Uuid::new_v4();

        let _rx = rooms.sender(active).subscribe();
        let _ = rooms.sender(idle);

        rooms.cleanup_inactive();

        assert_eq!(rooms.subscriber_count(active), 1);
        assert_eq!(rooms.subscriber_count(idle), 0);
        assert_eq!(rooms.channels.lock().unwrap().len(), 1);
    }
}
