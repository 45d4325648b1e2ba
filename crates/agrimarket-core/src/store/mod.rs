//! Storage traits and backends
//!
//! The server talks to storage only through these traits. Two backends exist:
//! [`PgStore`] for PostgreSQL and [`MemoryStore`] for tests and local runs.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Announcement, AnnouncementUpdate, Message, MessageFilter, NewAnnouncement, NewMessage,
    NewToken, NewUser, Result, TokenRecord, User, UserFilter, UserType, UserUpdate,
};

/// Trait for user account operations
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user; fails with `MarketError::Conflict` if the email is taken
    async fn create_user(&self, user: NewUser) -> Result<User>;

    /// Get a user by ID regardless of account state
    async fn find_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get a user by normalised email regardless of account state
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Get an active user by normalised email
    async fn find_active_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Get an active user by ID (used to check message receivers)
    async fn find_active_user(&self, id: i64) -> Result<Option<User>>;

    /// Apply an update; returns `None` if the user does not exist
    async fn update_user(&self, id: i64, update: &UserUpdate) -> Result<Option<User>>;

    /// List users newest first
    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>>;

    /// Count users, optionally by type and optionally only active ones
    async fn count_users(&self, user_type: Option<UserType>, active_only: bool) -> Result<i64>;
}

/// Trait for bearer token persistence
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Persist a token digest
    async fn insert_token(&self, token: NewToken) -> Result<TokenRecord>;

    /// Resolve a token digest to its owner.
    ///
    /// Returns the user only if the token exists, `now < expires_at`,
    /// and the owner is active.
    async fn find_user_by_token(&self, token_hash: &str, now: DateTime<Utc>)
        -> Result<Option<User>>;

    /// Delete a token; returns whether a row was removed
    async fn delete_token(&self, token_hash: &str) -> Result<bool>;

    /// Delete every token with `expires_at <= now`; returns the number removed
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Trait for announcement operations
#[async_trait]
pub trait AnnouncementRepository: Send + Sync {
    async fn create_announcement(&self, announcement: NewAnnouncement) -> Result<Announcement>;

    async fn find_announcement(&self, id: i64) -> Result<Option<Announcement>>;

    /// Important announcements first, then newest first
    async fn list_announcements(
        &self,
        important_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Announcement>>;

    async fn count_announcements(&self, important_only: bool) -> Result<i64>;

    async fn update_announcement(
        &self,
        id: i64,
        update: &AnnouncementUpdate,
    ) -> Result<Option<Announcement>>;

    /// Hard delete; returns whether a row was removed
    async fn delete_announcement(&self, id: i64) -> Result<bool>;
}

/// Trait for direct messages
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Insert an unread message
    async fn create_message(&self, message: NewMessage) -> Result<Message>;

    /// Newest first
    async fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<Message>>;

    /// Mark a message read if `receiver_id` received it; returns whether it did
    async fn mark_read(&self, id: i64, receiver_id: i64) -> Result<bool>;
}
