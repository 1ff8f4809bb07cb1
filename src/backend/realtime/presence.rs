//! Connection-counted presence tracking.
//!
//! Every SSE subscription registers with the presence registry; a user is
//! online while they hold at least one live stream. The guard returned by
//! [`PresenceRegistry::connect`] decrements the count when the stream drops,
//! and the last drop records `last_seen` in the database (best-effort) and
//! emits a presence event.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sqlx::PgPool;
use uuid::Uuid;

use crate::backend::realtime::broadcast::{broadcast_event, RealtimeEventBroadcast};
use crate::shared::{EventKind, RealtimeEvent};

/// In-memory registry of connected users and their stream counts
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    connections: Arc<Mutex<HashMap<Uuid, usize>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one live stream for a user. Emits an online presence event
    /// on the first concurrent connection.
    pub fn connect(
        &self,
        user_id: Uuid,
        pool: Option<PgPool>,
        events: RealtimeEventBroadcast,
    ) -> PresenceGuard {
        let came_online = {
            let mut connections = self.connections.lock().unwrap();
            let count = connections.entry(user_id).or_insert(0);
            *count += 1;
            *count == 1
        };

        if came_online {
            broadcast_event(
                &events,
                RealtimeEvent::new(
                    EventKind::Presence,
                    serde_json::json!({"user_id": user_id, "online": true}),
                ),
            );
        }

        PresenceGuard {
            registry: self.clone(),
            user_id,
            pool,
            events,
        }
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.connections.lock().unwrap().contains_key(&user_id)
    }

    pub fn online_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }
}

/// Live-stream handle; dropping it unregisters the connection.
pub struct PresenceGuard {
    registry: PresenceRegistry,
    user_id: Uuid,
    pool: Option<PgPool>,
    events: RealtimeEventBroadcast,
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        let went_offline = {
            let mut connections = self.registry.connections.lock().unwrap();
            match connections.get_mut(&self.user_id) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    connections.remove(&self.user_id);
                    true
                }
                None => false,
            }
        };

        if !went_offline {
            return;
        }

        broadcast_event(
            &self.events,
            RealtimeEvent::new(
                EventKind::Presence,
                serde_json::json!({"user_id": self.user_id, "online": false}),
            ),
        );

        // Record last_seen outside the Drop; skipped when no runtime or no
        // database is around (tests, degraded startup).
        if let (Some(pool), Ok(handle)) = (self.pool.clone(), tokio::runtime::Handle::try_current())
        {
            let user_id = self.user_id;
            handle.spawn(async move {
                if let Err(e) = crate::backend::auth::users::set_online(&pool, user_id, false).await
                {
                    tracing::warn!("failed to record last_seen for {}: {:?}", user_id, e);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast;

    #[tokio::test]
    async fn test_connect_and_drop() {
        let registry = PresenceRegistry::new();
        let (events, _) = broadcast::channel(16);
        let user = Uuid::new_v4();

        assert!(!registry.is_online(user));
        let guard = registry.connect(user, None, events.clone());
        assert!(registry.is_online(user));

        drop(guard);
        assert!(!registry.is_online(user));
    }

    #[tokio::test]
    async fn test_multiple_streams_keep_user_online() {
        let registry = PresenceRegistry::new();
        let (events, _) = broadcast::channel(16);
        let user = Uuid::new_v4();

        let first = registry.connect(user, None, events.clone());
        let second = registry.connect(user, None, events.clone());

        drop(first);
        assert!(registry.is_online(user));

        drop(second);
        assert!(!registry.is_online(user));
    }

    #[tokio::test]
    async fn test_presence_events_on_edge_transitions() {
        let registry = PresenceRegistry::new();
        let (events, mut rx) = broadcast::channel(16);
        let user = Uuid::new_v4();

        let first = registry.connect(user, None, events.clone());
        let online = rx.recv().await.unwrap();
        assert_eq!(online.kind, EventKind::Presence);
        assert_eq!(online.payload["online"], true);

        // A second stream for the same user is not a transition.
        let second = registry.connect(user, None, events.clone());
        drop(second);
        assert!(rx.try_recv().is_err());

        drop(first);
        let offline = rx.recv().await.unwrap();
        assert_eq!(offline.payload["online"], false);
    }

    #[tokio::test]
    async fn test_online_count_tracks_distinct_users() {
        let registry = PresenceRegistry::new();
        let (events, _) = broadcast::channel(16);

        let _a = registry.connect(Uuid::new_v4(), None, events.clone());
        let _b = registry.connect(Uuid::new_v4(), None, events.clone());
        assert_eq!(registry.online_count(), 2);
    }
}
