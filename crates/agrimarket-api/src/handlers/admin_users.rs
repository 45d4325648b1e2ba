//! Admin user management handlers

use super::IdQuery;
use crate::audit::{audit_log, AuditEvent};
use crate::auth::RequestContext;
use crate::error::AppError;
use crate::response::{ApiJson, ApiResponse};
use crate::state::AppState;
use crate::validation::{is_truthy, optional_text, page_limit, page_offset, validate_email};
use agrimarket_core::{User, UserFilter, UserPublic, UserType, UserUpdate, VerificationChange};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

/// Query parameters for listing users
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListUsersQuery {
    /// Page size (default 20, max 100)
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// `farmer`, `buyer` or `admin`
    pub user_type: Option<String>,
    /// When truthy, return only the number of active users
    pub count_only: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserListResponse {
    pub users: Vec<UserPublic>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserCountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserData {
    pub user: UserPublic,
}

/// Body of `PUT /api/admin/users`
///
/// Fields outside this set are ignored.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub barangay_id: Option<String>,
    pub product_type: Option<String>,
    pub verification_notes: Option<String>,
    pub is_verified: Option<bool>,
    pub is_active: Option<bool>,
}

/// List users or count active users
#[utoipa::path(
    get,
    path = "/api/admin/users",
    tag = "admin",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Users retrieved", body = UserListResponse),
        (status = 400, description = "Invalid query parameters", body = crate::error::ApiError),
        (status = 401, description = "Authentication required", body = crate::error::ApiError),
        (status = 403, description = "Admin access required", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    query: Result<Query<ListUsersQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    ctx.require_role(UserType::Admin)?;
    let Query(query) = query?;

    let user_type = match query.user_type.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(
            raw.parse::<UserType>()
                .map_err(|_| AppError::BadRequest("Invalid user type".to_string()))?,
        ),
        _ => None,
    };

    if is_truthy(query.count_only.as_deref()) {
        let count = state.users.count_users(user_type, true).await?;
        return Ok(ApiResponse::ok("User count retrieved", UserCountResponse { count }).into_response());
    }

    let limit = page_limit(query.limit);
    let offset = page_offset(query.offset);
    let users = state
        .users
        .list_users(&UserFilter {
            user_type,
            limit,
            offset,
        })
        .await?;
    let total = state.users.count_users(user_type, false).await?;

    Ok(ApiResponse::ok(
        "Users retrieved successfully",
        UserListResponse {
            users: users.iter().map(User::to_public).collect(),
            total,
            limit,
            offset,
        },
    )
    .into_response())
}

/// Update another user's profile, verification or active status
#[utoipa::path(
    put,
    path = "/api/admin/users",
    tag = "admin",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserData),
        (status = 400, description = "Missing ID, invalid field, or nothing to update", body = crate::error::ApiError),
        (status = 401, description = "Authentication required", body = crate::error::ApiError),
        (status = 403, description = "Admin access required", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ApiJson(request): ApiJson<UpdateUserRequest>,
) -> Result<ApiResponse<UserData>, AppError> {
    let admin = ctx.require_role(UserType::Admin)?;
    let id = request
        .id
        .ok_or_else(|| AppError::BadRequest("User ID required".to_string()))?;

    if id == admin.id && (request.is_verified.is_some() || request.is_active.is_some()) {
        return Err(AppError::BadRequest(
            "Cannot change your own verification or active status".to_string(),
        ));
    }

    if state.users.find_by_id(id).await?.is_none() {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let update = build_update(request, admin.id)?;
    if update.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }
    let fields = changed_fields(&update);

    let user = state
        .users
        .update_user(id, &update)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    audit_log(&AuditEvent::UserUpdated {
        admin_id: admin.id,
        target_user_id: id,
        fields,
        ip_address: ctx.ip_address.clone(),
    });

    Ok(ApiResponse::ok(
        "User updated successfully",
        UserData {
            user: user.to_public(),
        },
    ))
}

/// Soft-delete a user
#[utoipa::path(
    delete,
    path = "/api/admin/users",
    tag = "admin",
    params(IdQuery),
    responses(
        (status = 200, description = "User deactivated"),
        (status = 400, description = "Missing ID or own account", body = crate::error::ApiError),
        (status = 401, description = "Authentication required", body = crate::error::ApiError),
        (status = 403, description = "Admin access required", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> Result<ApiResponse<()>, AppError> {
    let admin = ctx.require_role(UserType::Admin)?;
    let Query(query) = query?;
    let id = query
        .id
        .ok_or_else(|| AppError::BadRequest("User ID required".to_string()))?;

    if id == admin.id {
        return Err(AppError::BadRequest(
            "Cannot delete your own account".to_string(),
        ));
    }

    let update = UserUpdate {
        is_active: Some(false),
        ..Default::default()
    };
    state
        .users
        .update_user(id, &update)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    audit_log(&AuditEvent::UserDeactivated {
        admin_id: admin.id,
        target_user_id: id,
        ip_address: ctx.ip_address.clone(),
    });

    Ok(ApiResponse::message("User deleted successfully"))
}

fn build_update(request: UpdateUserRequest, admin_id: i64) -> Result<UserUpdate, AppError> {
    let verification = request.is_verified.map(|verified| {
        if verified {
            VerificationChange::Verified {
                by: admin_id,
                at: Utc::now(),
            }
        } else {
            VerificationChange::Unverified
        }
    });

    Ok(UserUpdate {
        name: optional_text("name", request.name)?,
        email: request.email.as_deref().map(validate_email).transpose()?,
        phone: optional_text("phone", request.phone)?,
        address: request.address.map(|v| v.trim().to_string()),
        barangay_id: request.barangay_id.map(|v| v.trim().to_string()),
        product_type: request.product_type.map(|v| v.trim().to_string()),
        verification_notes: request.verification_notes.map(|v| v.trim().to_string()),
        is_active: request.is_active,
        verification,
    })
}

fn changed_fields(update: &UserUpdate) -> Vec<String> {
    let candidates = [
        ("name", update.name.is_some()),
        ("email", update.email.is_some()),
        ("phone", update.phone.is_some()),
        ("address", update.address.is_some()),
        ("barangay_id", update.barangay_id.is_some()),
        ("product_type", update.product_type.is_some()),
        ("verification_notes", update.verification_notes.is_some()),
        ("is_active", update.is_active.is_some()),
        ("is_verified", update.verification.is_some()),
    ];

    candidates
        .into_iter()
        .filter(|(_, present)| *present)
        .map(|(name, _)| name.to_string())
        .collect()
}
