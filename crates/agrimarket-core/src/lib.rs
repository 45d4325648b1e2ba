//! Agri-Market Core - Domain models, storage traits, and shared types
//!
//! This crate defines the core abstractions used throughout the marketplace backend:
//! - User accounts and their verification metadata
//! - Opaque bearer token records
//! - Announcements authored by administrators
//! - Direct messages between users
//! - Common error types
//! - Storage traits with PostgreSQL and in-memory backends
//! - Configuration management

pub mod config;
pub mod store;

pub use config::{
    AppConfig, AuthConfig, ConfigError, DatabaseConfig, LoggingConfig, ServerConfig, StorageKind,
};
pub use store::{
    AnnouncementRepository, MemoryStore, MessageRepository, PgStore, TokenRepository,
    UserRepository,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for marketplace operations
#[derive(Error, Debug)]
pub enum MarketError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MarketError>;

// ============================================================================
// Users
// ============================================================================

/// Account type of a marketplace user
///
/// The type is chosen at registration and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Farmer,
    Buyer,
    Admin,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Farmer => "farmer",
            UserType::Buyer => "buyer",
            UserType::Admin => "admin",
        }
    }
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserType {
    type Err = MarketError;

    /// Parses the exact lowercase wire names; anything else is rejected.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "farmer" => Ok(UserType::Farmer),
            "buyer" => Ok(UserType::Buyer),
            "admin" => Ok(UserType::Admin),
            other => Err(MarketError::Validation(format!("Invalid user type: {other}"))),
        }
    }
}

/// Normalise an email address for storage and lookup.
///
/// Emails are compared case-insensitively on every backend, so both the
/// uniqueness check and login go through this function.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// User account record
///
/// This maps to the `users` table. `password_hash` is never serialized;
/// API responses use [`UserPublic`].
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub phone: String,
    pub address: String,
    pub user_type: UserType,
    pub is_verified: bool,
    /// `false` marks a soft-deleted account
    pub is_active: bool,
    pub barangay_id: Option<String>,
    pub product_type: Option<String>,
    pub verification_notes: Option<String>,
    pub verification_date: Option<DateTime<Utc>>,
    /// Admin who verified this account
    pub verified_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.user_type == UserType::Admin
    }

    /// Convert user to public representation (without the password digest)
    pub fn to_public(&self) -> UserPublic {
        UserPublic {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
            user_type: self.user_type,
            is_verified: self.is_verified,
            is_active: self.is_active,
            barangay_id: self.barangay_id.clone(),
            product_type: self.product_type.clone(),
            verification_notes: self.verification_notes.clone(),
            verification_date: self.verification_date,
            verified_by: self.verified_by,
            created_at: self.created_at,
        }
    }
}

/// Public user representation (safe for API responses)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserPublic {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub user_type: UserType,
    pub is_verified: bool,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barangay_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Data required to insert a new user row
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    /// Must already be normalised with [`normalize_email`]
    pub email: String,
    pub password_hash: String,
    pub phone: String,
    pub address: String,
    pub user_type: UserType,
    pub is_verified: bool,
}

/// Change to an account's verification state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationChange {
    /// Mark verified, stamping who verified it and when
    Verified { by: i64, at: DateTime<Utc> },
    /// Clear verification and its stamp
    Unverified,
}

/// Typed allowlist of user fields an administrator may change
///
/// `None` leaves the column untouched. `user_type` cannot be changed.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub barangay_id: Option<String>,
    pub product_type: Option<String>,
    pub verification_notes: Option<String>,
    pub is_active: Option<bool>,
    pub verification: Option<VerificationChange>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.address.is_none()
            && self.barangay_id.is_none()
            && self.product_type.is_none()
            && self.verification_notes.is_none()
            && self.is_active.is_none()
            && self.verification.is_none()
    }

    /// Apply this update to an in-memory user record
    pub fn apply_to(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
        if let Some(phone) = &self.phone {
            user.phone = phone.clone();
        }
        if let Some(address) = &self.address {
            user.address = address.clone();
        }
        if let Some(barangay_id) = &self.barangay_id {
            user.barangay_id = Some(barangay_id.clone());
        }
        if let Some(product_type) = &self.product_type {
            user.product_type = Some(product_type.clone());
        }
        if let Some(notes) = &self.verification_notes {
            user.verification_notes = Some(notes.clone());
        }
        if let Some(active) = self.is_active {
            user.is_active = active;
        }
        match self.verification {
            Some(VerificationChange::Verified { by, at }) => {
                user.is_verified = true;
                user.verified_by = Some(by);
                user.verification_date = Some(at);
            }
            Some(VerificationChange::Unverified) => {
                user.is_verified = false;
                user.verified_by = None;
                user.verification_date = None;
            }
            None => {}
        }
    }
}

/// Filter for admin user listings
#[derive(Debug, Clone)]
pub struct UserFilter {
    pub user_type: Option<UserType>,
    pub limit: i64,
    pub offset: i64,
}

// ============================================================================
// Tokens
// ============================================================================

/// Persisted bearer token
///
/// Only the SHA-256 digest of the token value is stored.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub id: i64,
    pub user_id: i64,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TokenRecord {
    /// A token is live while `now` is strictly before its expiry
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Data required to insert a token row
#[derive(Debug, Clone)]
pub struct NewToken {
    pub user_id: i64,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Announcements
// ============================================================================

/// Community announcement authored by an administrator
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Announcement {
    pub id: i64,
    pub admin_id: i64,
    /// Author display name, joined from `users`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_name: Option<String>,
    pub title: String,
    pub content: String,
    pub is_important: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAnnouncement {
    pub admin_id: i64,
    pub title: String,
    pub content: String,
    pub is_important: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AnnouncementUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub is_important: Option<bool>,
}

impl AnnouncementUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.is_important.is_none()
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Direct message between two users
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub id: i64,
    pub sender_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub receiver_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_name: Option<String>,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: i64,
    pub receiver_id: i64,
    pub message: String,
}

/// Which messages a user may see
#[derive(Debug, Clone)]
pub struct MessageFilter {
    /// Sender or receiver
    pub user_id: i64,
    /// Only the exchange with this user
    pub conversation_with: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

impl MessageFilter {
    pub fn matches(&self, message: &Message) -> bool {
        let involved = message.sender_id == self.user_id || message.receiver_id == self.user_id;
        let in_conversation = match self.conversation_with {
            Some(other) => message.sender_id == other || message.receiver_id == other,
            None => true,
        };
        involved && in_conversation
    }
}
