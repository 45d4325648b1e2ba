//! Direct message handlers
//!
//! Every method requires a signed-in user. Messages can only be addressed to
//! active accounts, and only their receiver can mark them read.

use crate::auth::RequestContext;
use crate::error::AppError;
use crate::response::{ApiJson, ApiResponse};
use crate::state::AppState;
use crate::validation::{page_limit, page_offset, require_fields};
use agrimarket_core::{Message, MessageFilter, NewMessage};
use axum::extract::{rejection::QueryRejection, Query, State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListMessagesQuery {
    /// Only the exchange with this user
    pub conversation_with: Option<i64>,
    /// Page size (default 20, max 100)
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageListResponse {
    pub messages: Vec<Message>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageData {
    pub message: Message,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub receiver_id: Option<i64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct MarkReadRequest {
    pub message_id: Option<i64>,
}

/// List the caller's messages, newest first
#[utoipa::path(
    get,
    path = "/api/messages",
    tag = "messages",
    params(ListMessagesQuery),
    responses(
        (status = 200, description = "Messages retrieved", body = MessageListResponse),
        (status = 400, description = "Invalid query parameters", body = crate::error::ApiError),
        (status = 401, description = "Authentication required", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    query: Result<Query<ListMessagesQuery>, QueryRejection>,
) -> Result<ApiResponse<MessageListResponse>, AppError> {
    let user = ctx.require_user()?;
    let Query(query) = query?;
    let limit = page_limit(query.limit);
    let offset = page_offset(query.offset);

    let messages = state
        .messages
        .list_messages(&MessageFilter {
            user_id: user.id,
            conversation_with: query.conversation_with,
            limit,
            offset,
        })
        .await?;

    Ok(ApiResponse::ok(
        "Messages retrieved successfully",
        MessageListResponse {
            messages,
            limit,
            offset,
        },
    ))
}

/// Send a message to another active user
#[utoipa::path(
    post,
    path = "/api/messages",
    tag = "messages",
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Message sent", body = MessageData),
        (status = 400, description = "Missing fields or receiver is the sender", body = crate::error::ApiError),
        (status = 401, description = "Authentication required", body = crate::error::ApiError),
        (status = 404, description = "Receiver not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ApiJson(request): ApiJson<SendMessageRequest>,
) -> Result<ApiResponse<MessageData>, AppError> {
    let sender = ctx.require_user()?;

    let receiver = request.receiver_id.map(|id| id.to_string());
    require_fields(&[
        ("receiver_id", receiver.as_deref()),
        ("message", request.message.as_deref()),
    ])?;
    let (Some(receiver_id), Some(text)) = (request.receiver_id, request.message) else {
        return Err(AppError::BadRequest("Missing required fields".to_string()));
    };

    // Deactivated accounts are never addressable
    if state.users.find_active_user(receiver_id).await?.is_none() {
        return Err(AppError::NotFound("Receiver not found".to_string()));
    }
    if receiver_id == sender.id {
        return Err(AppError::BadRequest(
            "Cannot send message to yourself".to_string(),
        ));
    }

    let message = state
        .messages
        .create_message(NewMessage {
            sender_id: sender.id,
            receiver_id,
            message: text.trim().to_string(),
        })
        .await?;

    tracing::debug!(
        message_id = message.id,
        sender_id = sender.id,
        receiver_id,
        "Message sent"
    );

    Ok(ApiResponse::ok(
        "Message sent successfully",
        MessageData { message },
    ))
}

/// Mark a received message as read
#[utoipa::path(
    put,
    path = "/api/messages",
    tag = "messages",
    request_body = MarkReadRequest,
    responses(
        (status = 200, description = "Message marked as read"),
        (status = 400, description = "Message ID required", body = crate::error::ApiError),
        (status = 401, description = "Authentication required", body = crate::error::ApiError),
        (status = 404, description = "Message not found or access denied", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn mark_message_read(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ApiJson(request): ApiJson<MarkReadRequest>,
) -> Result<ApiResponse<()>, AppError> {
    let user = ctx.require_user()?;
    let id = request
        .message_id
        .ok_or_else(|| AppError::BadRequest("Message ID required".to_string()))?;

    if !state.messages.mark_read(id, user.id).await? {
        return Err(AppError::NotFound(
            "Message not found or access denied".to_string(),
        ));
    }

    Ok(ApiResponse::message("Message marked as read"))
}
