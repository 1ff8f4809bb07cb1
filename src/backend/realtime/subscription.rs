//! SSE subscription handlers.
//!
//! `GET /realtime/chats/{conversation_id}` and
//! `GET /realtime/groups/{group_id}` stream a room's events to an
//! authenticated participant. Receivers that lag skip ahead; axum's
//! keep-alive comments hold the connection open between events. Holding a
//! stream also registers the caller with the presence registry.
//!
//! Group streams apply the same per-viewer visibility rules as the HTTP
//! listing: non-admin subscribers never receive messages from hidden
//! senders (their own excepted).

use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tokio_stream::Stream;
use uuid::Uuid;

use crate::backend::auth::users;
use crate::backend::chat::db as chat_db;
use crate::backend::error::ApiError;
use crate::backend::groups::db as groups_db;
use crate::backend::groups::visibility::{self, ViewerContext};
use crate::backend::middleware::auth::AuthUser;
use crate::backend::realtime::presence::PresenceGuard;
use crate::backend::server::state::AppState;
use crate::shared::RealtimeEvent;

/// Per-subscriber filter for group streams
struct GroupFilter {
    ctx: ViewerContext,
    hidden_members: HashSet<Uuid>,
}

fn event_stream(
    rx: Receiver<RealtimeEvent>,
    guard: PresenceGuard,
    filter: Option<GroupFilter>,
) -> impl Stream<Item = Result<Event, axum::Error>> {
    stream::unfold((rx, guard, filter), |(mut rx, guard, filter)| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(filter) = &filter {
                        if !visibility::event_visible(&filter.ctx, &event, &filter.hidden_members)
                        {
                            continue;
                        }
                    }
                    let data = match serde_json::to_string(&event) {
                        Ok(data) => data,
                        Err(e) => {
                            tracing::error!("failed to serialize event: {:?}", e);
                            continue;
                        }
                    };
                    let sse_event = Event::default().event(event.kind.sse_name()).data(data);
                    return Some((Ok(sse_event), (rx, guard, filter)));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("subscriber lagged, skipped {} events", skipped);
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

/// Subscribe to a conversation's events (GET
/// /realtime/chats/{conversation_id}).
pub async fn subscribe_conversation(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let pool = state
        .db_pool
        .clone()
        .ok_or(ApiError::ServiceUnavailable("database"))?;

    let conversation = chat_db::get_conversation(&pool, conversation_id)
        .await?
        .ok_or_else(|| ApiError::not_found("conversation not found"))?;
    if !conversation.involves(auth.user_id) {
        return Err(ApiError::forbidden("not a participant"));
    }

    if let Err(e) = users::set_online(&pool, auth.user_id, true).await {
        tracing::warn!("failed to record online state: {:?}", e);
    }
    let guard = state
        .presence
        .connect(auth.user_id, Some(pool), state.events.clone());
    let rx = state.rooms.sender(conversation_id).subscribe();

    tracing::info!(
        "user {} subscribed to conversation {}",
        auth.user_id,
        conversation_id
    );

    Ok(Sse::new(event_stream(rx, guard, None)).keep_alive(KeepAlive::default()))
}

/// Subscribe to a group's events (GET /realtime/groups/{group_id}).
pub async fn subscribe_group(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(group_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let pool = state
        .db_pool
        .clone()
        .ok_or(ApiError::ServiceUnavailable("database"))?;

    let group = groups_db::get_group(&pool, group_id)
        .await?
        .ok_or_else(|| ApiError::not_found("group not found"))?;
    if !groups_db::is_member(&pool, group_id, auth.user_id).await? {
        return Err(ApiError::forbidden("not a group member"));
    }

    let filter = GroupFilter {
        ctx: ViewerContext {
            viewer_id: auth.user_id,
            is_admin: group.admin_id == auth.user_id,
        },
        hidden_members: groups_db::hidden_members(&pool, group_id)
            .await?
            .into_iter()
            .collect(),
    };

    if let Err(e) = users::set_online(&pool, auth.user_id, true).await {
        tracing::warn!("failed to record online state: {:?}", e);
    }
    let guard = state
        .presence
        .connect(auth.user_id, Some(pool), state.events.clone());
    let rx = state.rooms.sender(group_id).subscribe();

    tracing::info!("user {} subscribed to group {}", auth.user_id, group_id);

    Ok(Sse::new(event_stream(rx, guard, Some(filter))).keep_alive(KeepAlive::default()))
}
