//! Authentication API handler
//!
//! A single `POST /api/auth` endpoint dispatches on the body's `action` field.

use crate::audit::{audit_log, AuditEvent};
use crate::auth::{LoginRequest, RegisterRequest, RequestContext};
use crate::error::AppError;
use crate::response::{ApiJson, ApiResponse};
use crate::state::AppState;
use agrimarket_core::UserPublic;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Body of `POST /api/auth`
///
/// Which fields are read depends on `action`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AuthRequest {
    /// `register`, `login`, `validate` or `logout`
    pub action: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "userType")]
    pub user_type: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    /// Token to validate or revoke
    pub token: Option<String>,
}

impl AuthRequest {
    fn into_register(self) -> RegisterRequest {
        RegisterRequest {
            name: self.name,
            email: self.email,
            password: self.password,
            user_type: self.user_type,
            phone: self.phone,
            address: self.address,
        }
    }

    fn into_login(self) -> LoginRequest {
        LoginRequest {
            email: self.email,
            password: self.password,
        }
    }
}

/// Token validation response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidateResponse {
    pub user: UserPublic,
}

/// Register, log in, validate a token, or log out
///
/// `data` carries an `AuthResponse` for `register` and `login` and a
/// `ValidateResponse` for `validate`.
#[utoipa::path(
    post,
    path = "/api/auth",
    tag = "auth",
    request_body = AuthRequest,
    responses(
        (status = 200, description = "Action succeeded", body = crate::auth::AuthResponse),
        (status = 400, description = "Invalid input, duplicate email, or unknown action", body = crate::error::ApiError),
        (status = 401, description = "Invalid credentials or token", body = crate::error::ApiError),
        (status = 403, description = "Admin registration not permitted", body = crate::error::ApiError),
        (status = 405, description = "Method not allowed", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn auth_handler(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ApiJson(request): ApiJson<AuthRequest>,
) -> Result<Response, AppError> {
    let action = request.action.clone().unwrap_or_default();

    match action.trim() {
        "register" => {
            let response = state.auth.register(request.into_register(), &ctx).await?;
            Ok(ApiResponse::ok("Registration successful", response).into_response())
        }
        "login" => {
            let response = state.auth.login(request.into_login(), &ctx).await?;
            Ok(ApiResponse::ok("Login successful", response).into_response())
        }
        "validate" => validate(&state, &ctx, request.token).await,
        "logout" => {
            let token = ctx.credential.clone().or(request.token);
            state.auth.logout(token.as_deref(), &ctx).await?;
            Ok(ApiResponse::message("Logout successful").into_response())
        }
        _ => Err(AppError::BadRequest("Invalid action".to_string())),
    }
}

/// The body's token wins; otherwise the request credential is checked
async fn validate(
    state: &AppState,
    ctx: &RequestContext,
    body_token: Option<String>,
) -> Result<Response, AppError> {
    let token = body_token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| ctx.credential.clone())
        .ok_or_else(|| AppError::BadRequest("Token required".to_string()))?;

    match state.auth.validate(&token).await {
        Ok(user) => {
            audit_log(&AuditEvent::TokenValidated {
                user_id: user.id,
                ip_address: ctx.ip_address.clone(),
            });
            Ok(ApiResponse::ok(
                "Token valid",
                ValidateResponse {
                    user: user.to_public(),
                },
            )
            .into_response())
        }
        Err(err) => {
            // The middleware already audited a failed request credential
            if let AppError::Unauthorized(reason) = &err {
                if ctx.credential.as_deref() != Some(token.trim()) {
                    audit_log(&AuditEvent::InvalidToken {
                        ip_address: ctx.ip_address.clone(),
                        user_agent: ctx.user_agent.clone(),
                        reason: reason.clone(),
                    });
                }
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_type_alias() {
        let request: AuthRequest = serde_json::from_str(
            r#"{"action":"register","userType":"farmer","email":"a@x.com"}"#,
        )
        .unwrap();
        assert_eq!(request.user_type.as_deref(), Some("farmer"));

        let register = request.into_register();
        assert_eq!(register.email.as_deref(), Some("a@x.com"));
    }

    #[test]
    fn test_both_user_type_spellings_rejected() {
        let err = serde_json::from_str::<AuthRequest>(
            r#"{"action":"register","userType":"farmer","user_type":"admin"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate field `user_type`"));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let request: AuthRequest =
            serde_json::from_str(r#"{"action":"login","remember_me":true}"#).unwrap();
        assert_eq!(request.action.as_deref(), Some("login"));
        assert!(request.into_login().email.is_none());
    }
}
