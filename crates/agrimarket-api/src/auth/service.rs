//! Authentication service layer
//!
//! Registration, login, token validation and logout. Orchestrates the
//! password hasher and the token store and enforces the account-state rules.

use super::middleware::RequestContext;
use super::password::{PasswordConfig, PasswordHasher};
use super::token::{IssuedToken, TokenStore};
use crate::audit::{audit_log, AuditEvent};
use crate::error::AppError;
use crate::validation::{require_fields, validate_email};
use agrimarket_core::{
    normalize_email, AuthConfig, NewUser, TokenRepository, User, UserPublic, UserRepository,
    UserType,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// User registration request
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    /// `farmer`, `buyer` or `admin`
    #[serde(alias = "userType")]
    pub user_type: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// User login request
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Sanitized user plus a fresh bearer token
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserPublic,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthResponse {
    fn new(user: &User, issued: IssuedToken) -> Self {
        Self {
            user: user.to_public(),
            token: issued.token,
            expires_at: issued.expires_at,
        }
    }
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    tokens: TokenStore,
    hasher: PasswordHasher,
    allow_admin_self_registration: bool,
    password_min_length: usize,
}

impl AuthService {
    /// Create a new authentication service from the auth policy
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<dyn TokenRepository>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            users,
            tokens: TokenStore::new(tokens, Duration::hours(i64::from(config.token_ttl_hours))),
            hasher: PasswordHasher::new(PasswordConfig::from(config)),
            allow_admin_self_registration: config.allow_admin_self_registration,
            password_min_length: config.password_min_length,
        }
    }

    /// Replace the Argon2 cost parameters
    pub fn with_password_config(mut self, config: PasswordConfig) -> Self {
        self.hasher = PasswordHasher::new(config);
        self
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    /// Register a new account and issue its first token
    pub async fn register(
        &self,
        request: RegisterRequest,
        ctx: &RequestContext,
    ) -> Result<AuthResponse, AppError> {
        let email_for_audit = request.email.as_deref().map(normalize_email).unwrap_or_default();

        match self.try_register(request, ctx).await {
            Ok((user, issued)) => {
                audit_log(&AuditEvent::RegistrationSuccess {
                    user_id: user.id,
                    email: user.email.clone(),
                    user_type: user.user_type.to_string(),
                    ip_address: ctx.ip_address.clone(),
                    user_agent: ctx.user_agent.clone(),
                });
                Ok(AuthResponse::new(&user, issued))
            }
            Err(err) => {
                audit_log(&AuditEvent::RegistrationFailure {
                    email: email_for_audit,
                    reason: err.to_string(),
                    ip_address: ctx.ip_address.clone(),
                    user_agent: ctx.user_agent.clone(),
                });
                Err(err)
            }
        }
    }

    async fn try_register(
        &self,
        request: RegisterRequest,
        ctx: &RequestContext,
    ) -> Result<(User, IssuedToken), AppError> {
        require_fields(&[
            ("name", request.name.as_deref()),
            ("email", request.email.as_deref()),
            ("password", request.password.as_deref()),
            ("user_type", request.user_type.as_deref()),
            ("phone", request.phone.as_deref()),
        ])?;

        let user_type: UserType = request
            .user_type
            .as_deref()
            .unwrap_or_default()
            .trim()
            .parse()
            .map_err(|_| AppError::BadRequest("Invalid user type".to_string()))?;

        let email = validate_email(request.email.as_deref().unwrap_or_default())?;

        let password = request.password.unwrap_or_default();
        if password.chars().count() < self.password_min_length {
            return Err(AppError::BadRequest(format!(
                "Password must be at least {} characters long",
                self.password_min_length
            )));
        }

        if user_type == UserType::Admin
            && !self.allow_admin_self_registration
            && !ctx.principal.is_admin()
        {
            return Err(AppError::Forbidden(
                "Only administrators can create administrator accounts".to_string(),
            ));
        }

        // Friendlier error; the unique index still decides races
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let password_hash = self
            .hasher
            .hash_blocking(password)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let user = self
            .users
            .create_user(NewUser {
                name: request.name.unwrap_or_default().trim().to_string(),
                email,
                password_hash,
                phone: request.phone.unwrap_or_default().trim().to_string(),
                address: request.address.unwrap_or_default().trim().to_string(),
                user_type,
                is_verified: user_type == UserType::Admin,
            })
            .await?;

        let issued = self.tokens.issue(user.id).await?;
        Ok((user, issued))
    }

    /// Verify credentials and issue a new token; earlier tokens stay valid
    pub async fn login(
        &self,
        request: LoginRequest,
        ctx: &RequestContext,
    ) -> Result<AuthResponse, AppError> {
        require_fields(&[
            ("email", request.email.as_deref()),
            ("password", request.password.as_deref()),
        ])?;

        let email = normalize_email(request.email.as_deref().unwrap_or_default());
        let password = request.password.unwrap_or_default();

        let login_failed = |reason: &str| {
            audit_log(&AuditEvent::LoginFailure {
                email: email.clone(),
                reason: reason.to_string(),
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
            });
            AppError::Unauthorized("Invalid email or password".to_string())
        };

        let Some(user) = self.users.find_active_by_email(&email).await? else {
            return Err(login_failed("Unknown or inactive account"));
        };

        if !self
            .hasher
            .verify_blocking(password, user.password_hash.clone())
            .await
        {
            return Err(login_failed("Invalid password"));
        }

        let issued = self.tokens.issue(user.id).await?;

        audit_log(&AuditEvent::LoginSuccess {
            user_id: user.id,
            email: user.email.clone(),
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
        });

        Ok(AuthResponse::new(&user, issued))
    }

    /// Resolve a token to an active user
    pub async fn validate(&self, token: &str) -> Result<User, AppError> {
        self.tokens
            .resolve(token)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))
    }

    /// Revoke the presented token, if any. Always succeeds for unknown tokens.
    pub async fn logout(&self, token: Option<&str>, ctx: &RequestContext) -> Result<(), AppError> {
        let token_revoked = match token {
            Some(token) => self.tokens.revoke(token).await?,
            None => false,
        };

        let user = ctx.user();
        audit_log(&AuditEvent::Logout {
            user_id: user.map(|u| u.id),
            email: user.map(|u| u.email.clone()),
            token_revoked,
            ip_address: ctx.ip_address.clone(),
        });

        Ok(())
    }
}
