//! Agri-Market API - REST server
//!
//! Account registration, login and bearer-token authentication for the
//! marketplace, plus the admin user, announcement and direct message
//! endpoints built on them.

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod state;
pub mod validation;

use crate::auth::middleware::FALLBACK_AUTH_HEADER;
use crate::state::AppState;
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[cfg(any(test, feature = "test-utils"))]
use agrimarket_core::AppConfig;

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Agri-Market API",
        version = "0.1.0",
        description = "Accounts, bearer-token authentication, announcements and messages for the barangay agri-market",
        license(name = "Apache-2.0")
    ),
    paths(
        handlers::health::health_check,
        handlers::auth::auth_handler,
        handlers::admin_users::list_users,
        handlers::admin_users::update_user,
        handlers::admin_users::delete_user,
        handlers::announcements::list_announcements,
        handlers::announcements::create_announcement,
        handlers::announcements::update_announcement,
        handlers::announcements::delete_announcement,
        handlers::messages::list_messages,
        handlers::messages::send_message,
        handlers::messages::mark_message_read,
    ),
    components(schemas(
        error::ApiError,
        handlers::health::HealthResponse,
        handlers::auth::AuthRequest,
        handlers::auth::ValidateResponse,
        auth::AuthResponse,
        agrimarket_core::UserPublic,
        agrimarket_core::UserType,
        agrimarket_core::Announcement,
        handlers::admin_users::UserListResponse,
        handlers::admin_users::UserCountResponse,
        handlers::admin_users::UserData,
        handlers::admin_users::UpdateUserRequest,
        handlers::announcements::AnnouncementListResponse,
        handlers::announcements::AnnouncementData,
        handlers::announcements::CreateAnnouncementRequest,
        handlers::announcements::UpdateAnnouncementRequest,
        agrimarket_core::Message,
        handlers::messages::MessageListResponse,
        handlers::messages::MessageData,
        handlers::messages::SendMessageRequest,
        handlers::messages::MarkReadRequest,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Liveness"),
        (name = "auth", description = "Registration, login, token validation and logout"),
        (name = "admin", description = "Administrator user management"),
        (name = "announcements", description = "Community announcements"),
        (name = "messages", description = "Direct messages between users"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route(
            "/health",
            get(handlers::health::health_check).fallback(routes::method_not_allowed),
        )
        .nest("/api", routes::api_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .fallback(routes::not_found)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::request_context_middleware,
        ))
        .layer(axum::middleware::from_fn(
            middleware::method_not_allowed_middleware,
        ))
        .layer(axum::middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// An empty list or `*` allows any origin
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(FALLBACK_AUTH_HEADER),
        ]);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();
    tracing::info!(allowed_origins = ?allowed, "CORS restricted to configured origins");

    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Router over in-memory storage with default configuration
#[cfg(any(test, feature = "test-utils"))]
pub fn create_router_for_testing() -> Router {
    create_test_app(AppConfig::default()).0
}

/// Router plus its state, for tests that seed or inspect storage
#[cfg(any(test, feature = "test-utils"))]
pub fn create_test_app(config: AppConfig) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::for_testing(config));
    (create_router(state.clone()), state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in [
            "/health",
            "/api/auth",
            "/api/admin/users",
            "/api/announcements",
            "/api/messages",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {expected}"
            );
        }
        assert!(doc
            .components
            .as_ref()
            .is_some_and(|c| c.security_schemes.contains_key("bearer_auth")));
    }
}
