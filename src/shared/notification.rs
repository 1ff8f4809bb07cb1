//! Device tokens for push notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered push device
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceToken {
    /// FCM registration token (unique)
    pub token: String,
    /// Project the device subscribes to
    pub project_id: String,
    /// `"android"` or `"ios"`
    pub platform: String,
    /// Unread badge counter, incremented on every push
    pub badge: i32,
    /// Opaque client metadata
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
