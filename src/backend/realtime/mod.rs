//! Real-time delivery: broadcast channels, presence tracking and SSE
//! subscriptions.

pub mod broadcast;
pub mod presence;
pub mod subscription;

pub use broadcast::{broadcast_event, RealtimeEventBroadcast};
pub use presence::{PresenceGuard, PresenceRegistry};
