//! Router configuration.
//!
//! Public routes (health, register, login, token refresh, password reset)
//! sit next to the protected group, which runs behind the Bearer-token
//! middleware. Admin checks happen in the handlers, matching where the
//! domain puts them (global admins, group admins, payment owners).

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::backend::auth::handlers::{directory, login, password, profile, register, session};
use crate::backend::branches::handlers as branch_handlers;
use crate::backend::chat::handlers as chat_handlers;
use crate::backend::error::ApiError;
use crate::backend::groups::handlers as group_handlers;
use crate::backend::middleware::auth::auth_middleware;
use crate::backend::notifications::handlers as notification_handlers;
use crate::backend::payments::handlers as payment_handlers;
use crate::backend::realtime::subscription;
use crate::backend::server::state::AppState;
use crate::backend::storage::upload;

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn not_found() -> ApiError {
    ApiError::not_found("route not found")
}

/// Build the full application router.
pub fn create_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/register", post(register::register))
        .route("/login", post(login::login))
        .route("/refresh-token", post(session::refresh_token))
        .route("/forgot-password", post(password::forgot_password))
        .route("/reset-password", post(password::reset_password));

    let protected = Router::new()
        // Session
        .route("/session", get(session::get_session))
        .route("/logout", post(session::logout))
        // Directory & profile
        .route("/users", get(directory::list_users))
        .route("/users/by-branch", get(directory::users_by_branch))
        .route(
            "/users/{id}",
            get(directory::get_user).post(directory::update_user),
        )
        .route("/users/{id}/status", get(directory::user_status))
        .route("/profile", put(profile::update_profile))
        // Branches
        .route("/branches", post(branch_handlers::create_branch))
        .route("/admin/branches", get(branch_handlers::list_branches))
        .route(
            "/admin/branches/{id}/users",
            get(branch_handlers::branch_users),
        )
        // Direct chat
        .route("/conversations", get(chat_handlers::list_conversations))
        .route(
            "/conversations/{id}/read",
            post(chat_handlers::mark_conversation_read),
        )
        .route(
            "/chats/{peer_id}",
            get(chat_handlers::get_chats).post(chat_handlers::send_message),
        )
        // Groups
        .route(
            "/groups",
            get(group_handlers::list_groups).post(group_handlers::create_group),
        )
        .route("/groups/mine", get(group_handlers::my_groups))
        .route(
            "/groups/{id}",
            get(group_handlers::get_group)
                .patch(group_handlers::update_group)
                .delete(group_handlers::delete_group),
        )
        .route("/groups/{id}/details", get(group_handlers::group_details))
        .route(
            "/groups/{id}/members",
            post(group_handlers::add_member).put(group_handlers::update_members),
        )
        .route(
            "/groups/{id}/members/{user_id}",
            delete(group_handlers::remove_member),
        )
        .route(
            "/groups/{id}/members/{user_id}/hidden",
            patch(group_handlers::hide_member),
        )
        .route(
            "/groups/{id}/admin/{user_id}",
            post(group_handlers::make_admin),
        )
        .route(
            "/groups/{id}/messages",
            get(group_handlers::list_group_messages).post(group_handlers::send_group_message),
        )
        .route("/groups/{id}/read", post(group_handlers::mark_group_read))
        .route(
            "/groups/{id}/messages/{message_id}",
            delete(group_handlers::delete_group_message),
        )
        .route(
            "/groups/{id}/messages/{message_id}/for-me",
            delete(group_handlers::delete_for_me),
        )
        .route(
            "/groups/{id}/messages/{message_id}/for-everyone",
            delete(group_handlers::delete_for_everyone),
        )
        // Realtime subscriptions
        .route(
            "/realtime/chats/{conversation_id}",
            get(subscription::subscribe_conversation),
        )
        .route(
            "/realtime/groups/{group_id}",
            get(subscription::subscribe_group),
        )
        // Payments
        .route(
            "/payments",
            get(payment_handlers::list_payments).post(payment_handlers::create_payment),
        )
        .route(
            "/payments/{id}",
            get(payment_handlers::get_payment)
                .put(payment_handlers::update_payment)
                .delete(payment_handlers::delete_payment),
        )
        // Notifications
        .route(
            "/notifications/token",
            post(notification_handlers::save_token),
        )
        .route(
            "/notifications/send",
            post(notification_handlers::send_by_project),
        )
        .route(
            "/notifications/reset-badge",
            post(notification_handlers::reset_badge),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .nest_service("/static", ServeDir::new("public"))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        // Room for the per-file cap plus multipart framing.
        .layer(DefaultBodyLimit::max(upload::max_file_bytes() + 1024 * 1024))
        .with_state(state)
}
