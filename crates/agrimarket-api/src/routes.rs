//! API route definitions

use crate::error::AppError;
use crate::handlers::{admin_users, announcements, auth, messages};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Routes mounted under `/api`
///
/// Authentication is resolved by the request context middleware for every
/// route; handlers decide what the caller may do.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth", post(auth::auth_handler).fallback(method_not_allowed))
        .route(
            "/admin/users",
            get(admin_users::list_users)
                .put(admin_users::update_user)
                .delete(admin_users::delete_user)
                .fallback(method_not_allowed),
        )
        .route(
            "/announcements",
            get(announcements::list_announcements)
                .post(announcements::create_announcement)
                .put(announcements::update_announcement)
                .delete(announcements::delete_announcement)
                .fallback(method_not_allowed),
        )
        .route(
            "/messages",
            get(messages::list_messages)
                .post(messages::send_message)
                .put(messages::mark_message_read)
                .fallback(method_not_allowed),
        )
}

pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

pub async fn not_found() -> AppError {
    AppError::NotFound("Endpoint not found".to_string())
}
