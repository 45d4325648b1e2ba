//! Announcement handlers
//!
//! Reading is public. Authoring requires an admin, and only the author may
//! change or remove an announcement.

use super::IdQuery;
use crate::auth::RequestContext;
use crate::error::AppError;
use crate::response::{ApiJson, ApiResponse};
use crate::state::AppState;
use crate::validation::{is_truthy, optional_text, page_limit, page_offset, require_fields};
use agrimarket_core::{Announcement, AnnouncementUpdate, NewAnnouncement, User, UserType};
use axum::extract::{rejection::QueryRejection, Query, State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

const NOT_FOUND_OR_DENIED: &str = "Announcement not found or access denied";

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListAnnouncementsQuery {
    /// Page size (default 20, max 100)
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// When truthy, only important announcements
    pub important: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AnnouncementListResponse {
    pub announcements: Vec<Announcement>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AnnouncementData {
    pub announcement: Announcement,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CreateAnnouncementRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub is_important: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateAnnouncementRequest {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub is_important: Option<bool>,
}

/// List announcements, important first
#[utoipa::path(
    get,
    path = "/api/announcements",
    tag = "announcements",
    params(ListAnnouncementsQuery),
    responses(
        (status = 200, description = "Announcements retrieved", body = AnnouncementListResponse),
        (status = 400, description = "Invalid query parameters", body = crate::error::ApiError),
    )
)]
pub async fn list_announcements(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListAnnouncementsQuery>, QueryRejection>,
) -> Result<ApiResponse<AnnouncementListResponse>, AppError> {
    let Query(query) = query?;
    let important_only = is_truthy(query.important.as_deref());
    let limit = page_limit(query.limit);
    let offset = page_offset(query.offset);

    let announcements = state
        .announcements
        .list_announcements(important_only, limit, offset)
        .await?;
    let total = state.announcements.count_announcements(important_only).await?;

    Ok(ApiResponse::ok(
        "Announcements retrieved successfully",
        AnnouncementListResponse {
            announcements,
            total,
            limit,
            offset,
        },
    ))
}

/// Publish an announcement
#[utoipa::path(
    post,
    path = "/api/announcements",
    tag = "announcements",
    request_body = CreateAnnouncementRequest,
    responses(
        (status = 200, description = "Announcement created", body = AnnouncementData),
        (status = 400, description = "Missing title or content", body = crate::error::ApiError),
        (status = 401, description = "Authentication required", body = crate::error::ApiError),
        (status = 403, description = "Only admins can create announcements", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_announcement(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ApiJson(request): ApiJson<CreateAnnouncementRequest>,
) -> Result<ApiResponse<AnnouncementData>, AppError> {
    let admin = ctx.require_role_with_message(UserType::Admin, "Only admins can create announcements")?;

    require_fields(&[
        ("title", request.title.as_deref()),
        ("content", request.content.as_deref()),
    ])?;

    let announcement = state
        .announcements
        .create_announcement(NewAnnouncement {
            admin_id: admin.id,
            title: request.title.unwrap_or_default().trim().to_string(),
            content: request.content.unwrap_or_default().trim().to_string(),
            is_important: request.is_important.unwrap_or(false),
        })
        .await?;

    tracing::info!(
        announcement_id = announcement.id,
        admin_id = admin.id,
        "Announcement created"
    );

    Ok(ApiResponse::ok(
        "Announcement created successfully",
        AnnouncementData { announcement },
    ))
}

/// Edit an announcement the caller authored
#[utoipa::path(
    put,
    path = "/api/announcements",
    tag = "announcements",
    request_body = UpdateAnnouncementRequest,
    responses(
        (status = 200, description = "Announcement updated", body = AnnouncementData),
        (status = 400, description = "Missing ID or nothing to update", body = crate::error::ApiError),
        (status = 401, description = "Authentication required", body = crate::error::ApiError),
        (status = 403, description = "Only admins can update announcements", body = crate::error::ApiError),
        (status = 404, description = "Announcement not found or access denied", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_announcement(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ApiJson(request): ApiJson<UpdateAnnouncementRequest>,
) -> Result<ApiResponse<AnnouncementData>, AppError> {
    let admin = ctx.require_role_with_message(UserType::Admin, "Only admins can update announcements")?;
    let id = request
        .id
        .ok_or_else(|| AppError::BadRequest("Announcement ID required".to_string()))?;

    ensure_author(&state, id, admin).await?;

    let update = AnnouncementUpdate {
        title: optional_text("title", request.title)?,
        content: optional_text("content", request.content)?,
        is_important: request.is_important,
    };
    if update.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let announcement = state
        .announcements
        .update_announcement(id, &update)
        .await?
        .ok_or_else(|| AppError::NotFound(NOT_FOUND_OR_DENIED.to_string()))?;

    Ok(ApiResponse::ok(
        "Announcement updated successfully",
        AnnouncementData { announcement },
    ))
}

/// Remove an announcement the caller authored
#[utoipa::path(
    delete,
    path = "/api/announcements",
    tag = "announcements",
    params(IdQuery),
    responses(
        (status = 200, description = "Announcement deleted"),
        (status = 400, description = "Missing ID", body = crate::error::ApiError),
        (status = 401, description = "Authentication required", body = crate::error::ApiError),
        (status = 403, description = "Only admins can delete announcements", body = crate::error::ApiError),
        (status = 404, description = "Announcement not found or access denied", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_announcement(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> Result<ApiResponse<()>, AppError> {
    let admin = ctx.require_role_with_message(UserType::Admin, "Only admins can delete announcements")?;
    let Query(query) = query?;
    let id = query
        .id
        .ok_or_else(|| AppError::BadRequest("Announcement ID required".to_string()))?;

    ensure_author(&state, id, admin).await?;

    if !state.announcements.delete_announcement(id).await? {
        return Err(AppError::NotFound(NOT_FOUND_OR_DENIED.to_string()));
    }

    tracing::info!(announcement_id = id, admin_id = admin.id, "Announcement deleted");

    Ok(ApiResponse::message("Announcement deleted successfully"))
}

/// Missing and foreign announcements are indistinguishable to the caller
async fn ensure_author(state: &AppState, id: i64, admin: &User) -> Result<(), AppError> {
    match state.announcements.find_announcement(id).await? {
        Some(existing) if existing.admin_id == admin.id => Ok(()),
        _ => Err(AppError::NotFound(NOT_FOUND_OR_DENIED.to_string())),
    }
}
