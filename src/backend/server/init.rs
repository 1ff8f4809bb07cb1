//! Server initialization.
//!
//! Builds the application state from the environment, wires the router and
//! starts the periodic cleanup of idle room channels. Optional services
//! that fail to configure are logged and disabled, never fatal.

use axum::Router;
use tokio::sync::broadcast;

use crate::backend::mail::Mailer;
use crate::backend::notifications::fcm::FcmClient;
use crate::backend::realtime::presence::PresenceRegistry;
use crate::backend::routes::create_router;
use crate::backend::server::config;
use crate::backend::server::state::{AppState, RoomBroadcastState};
use crate::backend::storage::s3::S3Client;
use crate::shared::RealtimeEvent;

/// Create and configure the application.
pub async fn create_app() -> Router {
    tracing::info!("initializing branchtalk server");

    let db_pool = config::load_database().await;

    let storage = match config::StorageConfig::from_env() {
        Some(cfg) => Some(S3Client::new(cfg)),
        None => {
            tracing::warn!("object storage not configured, uploads disabled");
            None
        }
    };

    let mailer = match config::MailConfig::from_env() {
        Some(cfg) => match Mailer::new(&cfg) {
            Ok(mailer) => Some(mailer),
            Err(e) => {
                tracing::error!("failed to build mail transport: {}", e);
                None
            }
        },
        None => {
            tracing::warn!("mail not configured, outbound mail disabled");
            None
        }
    };

    let push = match config::PushConfig::from_env() {
        Some(cfg) => match FcmClient::load(&cfg) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::error!("failed to load FCM service account: {}", e);
                None
            }
        },
        None => {
            tracing::warn!("push not configured, notifications disabled");
            None
        }
    };

    let (events, _) = broadcast::channel::<RealtimeEvent>(1000);

    let state = AppState {
        db_pool,
        rooms: RoomBroadcastState::new(),
        presence: PresenceRegistry::new(),
        events,
        storage,
        mailer,
        push,
    };

    // Sweep subscriber-less room channels every five minutes.
    let cleanup_rooms = state.rooms.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            cleanup_rooms.cleanup_inactive();
            tracing::debug!("cleaned up inactive room channels");
        }
    });

    tracing::info!("router configured");
    create_router(state)
}
