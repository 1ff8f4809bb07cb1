//! Event broadcasting.
//!
//! Events go out over `tokio::sync::broadcast`: every subscriber receives a
//! copy of each event, and a send with no subscribers is simply dropped.
//! Receivers that fall behind skip ahead (no backpressure, no redelivery) —
//! per-room channels live in
//! [`RoomBroadcastState`](crate::backend::server::state::RoomBroadcastState),
//! this module carries the global channel type and the send helper.

use tokio::sync::broadcast;

use crate::shared::RealtimeEvent;

/// Global real-time event channel (presence and other cross-room events).
///
/// Cloneable; can be handed to any task that needs to emit events.
pub type RealtimeEventBroadcast = broadcast::Sender<RealtimeEvent>;

/// Broadcast an event to all subscribers.
///
/// Returns the number of subscribers that received it (0 when nobody is
/// listening, which is not an error).
pub fn broadcast_event(broadcast_tx: &RealtimeEventBroadcast, event: RealtimeEvent) -> usize {
    match broadcast_tx.send(event) {
        Ok(subscriber_count) => subscriber_count,
        Err(_) => {
            tracing::debug!("no subscribers to receive event");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::EventKind;

    #[tokio::test]
    async fn test_broadcast_event_with_subscriber() {
        let (tx, mut rx) = broadcast::channel::<RealtimeEvent>(16);

        let event = RealtimeEvent::new(EventKind::Presence, serde_json::json!({"online": true}));
        let count = broadcast_event(&tx, event);
        assert_eq!(count, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, EventKind::Presence);
        assert_eq!(received.payload["online"], true);
    }

    #[tokio::test]
    async fn test_broadcast_event_no_subscribers() {
        let (tx, _) = broadcast::channel::<RealtimeEvent>(16);
        drop(tx.subscribe());

        let event = RealtimeEvent::new(EventKind::Read, serde_json::json!({}));
        assert_eq!(broadcast_event(&tx, event), 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let (tx, _) = broadcast::channel::<RealtimeEvent>(16);
        let mut rx1 = tx.subscribe();
        let mut rx2 = tx.subscribe();
        let mut rx3 = tx.subscribe();

        let event = RealtimeEvent::new(EventKind::Read, serde_json::json!({"n": 1}));
        assert_eq!(broadcast_event(&tx, event), 3);

        for rx in [&mut rx1, &mut rx2, &mut rx3] {
            let received = rx.recv().await.unwrap();
            assert_eq!(received.payload["n"], 1);
        }
    }
}
