//! Request context middleware
//!
//! Extracts a bearer credential, resolves it to a user, and inserts a
//! [`RequestContext`] into the request extensions. It never rejects a request
//! for authentication reasons: handlers decide what a principal may do.
//!
//! Credential sources, in priority order:
//! 1. `Authorization: Bearer <token>`
//! 2. `X-Authorization: [Bearer ]<token>` for proxies that strip `Authorization`
//! 3. a `token` field in a JSON body, only when neither header is present
//!
//! Reading the body consumes it, so a JSON body over `max_body_size` ends the
//! request with 400 "Request body too large".

use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::error::AppError;
use crate::state::AppState;
use agrimarket_core::{User, UserType};
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;

/// Fallback credential header
pub const FALLBACK_AUTH_HEADER: &str = "x-authorization";

/// Identity resolved for the current request
#[derive(Debug, Clone, Default)]
pub enum Principal {
    #[default]
    Anonymous,
    User(User),
}

impl Principal {
    pub fn user(&self) -> Option<&User> {
        match self {
            Principal::User(user) => Some(user),
            Principal::Anonymous => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.user().is_some_and(User::is_admin)
    }

    /// 401 "Authentication required" for anonymous requests
    pub fn require_user(&self) -> Result<&User, AppError> {
        self.user().ok_or_else(AppError::authentication_required)
    }

    /// 401 when anonymous, 403 "<Role> access required" when the type differs
    pub fn require_role(&self, role: UserType) -> Result<&User, AppError> {
        let user = self.require_user()?;
        if user.user_type == role {
            Ok(user)
        } else {
            Err(AppError::Forbidden(role_required_message(role).to_string()))
        }
    }
}

fn role_required_message(role: UserType) -> &'static str {
    match role {
        UserType::Admin => "Admin access required",
        UserType::Farmer => "Farmer access required",
        UserType::Buyer => "Buyer access required",
    }
}

/// Per-request authentication context
#[derive(Clone, Default)]
pub struct RequestContext {
    pub principal: Principal,
    /// Raw credential as presented; never logged
    pub credential: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("principal", &self.principal)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("ip_address", &self.ip_address)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl RequestContext {
    /// Anonymous context carrying only client metadata
    pub fn anonymous(headers: &HeaderMap) -> Self {
        Self {
            principal: Principal::Anonymous,
            credential: None,
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.principal.user()
    }

    pub fn require_user(&self) -> Result<&User, AppError> {
        self.principal.require_user().inspect_err(|_| self.audit_denied(None))
    }

    pub fn require_role(&self, role: UserType) -> Result<&User, AppError> {
        self.principal
            .require_role(role)
            .inspect_err(|_| self.audit_denied(Some(role)))
    }

    /// Like [`require_role`](Self::require_role) with a custom 403 message
    pub fn require_role_with_message(
        &self,
        role: UserType,
        denied: &str,
    ) -> Result<&User, AppError> {
        self.require_role(role).map_err(|err| match err {
            AppError::Forbidden(_) => AppError::Forbidden(denied.to_string()),
            other => other,
        })
    }

    fn audit_denied(&self, required_role: Option<UserType>) {
        let user = self.user();
        audit_log(&AuditEvent::AccessDenied {
            user_id: user.map(|u| u.id),
            email: user.map(|u| u.email.clone()),
            required_role: required_role.map(|r| r.to_string()),
            ip_address: self.ip_address.clone(),
            user_agent: self.user_agent.clone(),
        });
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(|| RequestContext::anonymous(&parts.headers)))
    }
}

/// Resolve the request's credential and attach a [`RequestContext`]
pub async fn request_context_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip_address = extract_ip_address(request.headers());
    let user_agent = extract_user_agent(request.headers());

    let (credential, mut request) = if has_auth_header(request.headers()) {
        (header_credential(request.headers()), request)
    } else {
        match body_credential(request, state.config.server.max_body_size).await {
            Ok(pair) => pair,
            Err(err) => return err.into_response(),
        }
    };

    let principal = match credential.as_deref() {
        Some(token) => resolve_principal(&state, token, &ip_address, &user_agent).await,
        None => Principal::Anonymous,
    };

    request.extensions_mut().insert(RequestContext {
        principal,
        credential,
        ip_address,
        user_agent,
    });

    next.run(request).await
}

async fn resolve_principal(
    state: &AppState,
    token: &str,
    ip_address: &Option<String>,
    user_agent: &Option<String>,
) -> Principal {
    match state.auth.validate(token).await {
        Ok(user) => {
            tracing::debug!(user_id = user.id, "Resolved bearer token");
            Principal::User(user)
        }
        Err(AppError::Unauthorized(reason)) => {
            audit_log(&AuditEvent::InvalidToken {
                ip_address: ip_address.clone(),
                user_agent: user_agent.clone(),
                reason,
            });
            Principal::Anonymous
        }
        Err(err) => {
            tracing::warn!(error = %err, "Token resolution failed, continuing anonymously");
            Principal::Anonymous
        }
    }
}

fn has_auth_header(headers: &HeaderMap) -> bool {
    headers.contains_key(header::AUTHORIZATION) || headers.contains_key(FALLBACK_AUTH_HEADER)
}

/// Credential from `Authorization`, falling back to `X-Authorization`
pub fn header_credential(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let fallback = || {
        headers
            .get(FALLBACK_AUTH_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.strip_prefix("Bearer ").unwrap_or(v))
    };

    bearer
        .or_else(fallback)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[derive(Deserialize)]
struct TokenField {
    #[serde(default)]
    token: Option<String>,
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

/// Buffer a JSON body, read its `token` field, and hand back an equivalent request
async fn body_credential(
    request: Request<Body>,
    limit: usize,
) -> Result<(Option<String>, Request<Body>), AppError> {
    if !is_json(request.headers()) {
        return Ok((None, request));
    }

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|_| AppError::BadRequest("Request body too large".to_string()))?;

    let token = serde_json::from_slice::<TokenField>(&bytes)
        .ok()
        .and_then(|field| field.token)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    Ok((token, Request::from_parts(parts, Body::from(bytes))))
}
