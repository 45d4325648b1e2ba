//! PostgreSQL storage backend
//!
//! Expects the schema in `schema/001_init.sql`. Email uniqueness is enforced by
//! the `users_email_lower_idx` unique index; unique violations surface as
//! `MarketError::Conflict`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;

use super::{AnnouncementRepository, MessageRepository, TokenRepository, UserRepository};
use crate::{
    Announcement, AnnouncementUpdate, MarketError, Message, MessageFilter, NewAnnouncement,
    NewMessage, NewToken, NewUser, Result, TokenRecord, User, UserFilter, UserType, UserUpdate,
    VerificationChange,
};

macro_rules! user_columns {
    () => {
        "id, name, email, password_hash, phone, address, user_type, is_verified, is_active, \
         barangay_id, product_type, verification_notes, verification_date, verified_by, created_at"
    };
}

macro_rules! announcement_select {
    () => {
        "SELECT a.id, a.admin_id, u.name AS admin_name, a.title, a.content, a.is_important, \
         a.created_at, a.updated_at \
         FROM announcements a LEFT JOIN users u ON a.admin_id = u.id"
    };
}

macro_rules! message_select {
    () => {
        "SELECT m.id, m.sender_id, s.name AS sender_name, m.receiver_id, r.name AS receiver_name, \
         m.message, m.is_read, m.created_at \
         FROM messages m \
         LEFT JOIN users s ON m.sender_id = s.id \
         LEFT JOIN users r ON m.receiver_id = r.id"
    };
}

/// PostgreSQL store
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store connection
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| MarketError::Database(format!("PostgreSQL connection failed: {e}")))?;

        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> MarketError {
    move |e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            MarketError::Conflict("Email already registered".to_string())
        }
        _ => MarketError::Database(format!("{context}: {e}")),
    }
}

/// User row from database
#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    password_hash: String,
    phone: String,
    address: String,
    user_type: String,
    is_verified: bool,
    is_active: bool,
    barangay_id: Option<String>,
    product_type: Option<String>,
    verification_notes: Option<String>,
    verification_date: Option<DateTime<Utc>>,
    verified_by: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = MarketError;

    fn try_from(row: UserRow) -> Result<Self> {
        let user_type = row.user_type.parse::<UserType>().map_err(|_| {
            MarketError::Database(format!(
                "Unexpected user_type {:?} for user {}",
                row.user_type, row.id
            ))
        })?;

        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            phone: row.phone,
            address: row.address,
            user_type,
            is_verified: row.is_verified,
            is_active: row.is_active,
            barangay_id: row.barangay_id,
            product_type: row.product_type,
            verification_notes: row.verification_notes,
            verification_date: row.verification_date,
            verified_by: row.verified_by,
            created_at: row.created_at,
        })
    }
}

fn into_user(row: Option<UserRow>) -> Result<Option<User>> {
    row.map(User::try_from).transpose()
}

/// Token row from database
#[derive(Debug, FromRow)]
struct TokenRow {
    id: i64,
    user_id: i64,
    token_hash: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<TokenRow> for TokenRecord {
    fn from(row: TokenRow) -> Self {
        TokenRecord {
            id: row.id,
            user_id: row.user_id,
            token_hash: row.token_hash,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
        }
    }
}

/// Announcement row joined with its author
#[derive(Debug, FromRow)]
struct AnnouncementRow {
    id: i64,
    admin_id: i64,
    admin_name: Option<String>,
    title: String,
    content: String,
    is_important: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AnnouncementRow> for Announcement {
    fn from(row: AnnouncementRow) -> Self {
        Announcement {
            id: row.id,
            admin_id: row.admin_id,
            admin_name: row.admin_name,
            title: row.title,
            content: row.content,
            is_important: row.is_important,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: i64,
    sender_id: i64,
    sender_name: Option<String>,
    receiver_id: i64,
    receiver_name: Option<String>,
    message: String,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            sender_id: row.sender_id,
            sender_name: row.sender_name,
            receiver_id: row.receiver_id,
            receiver_name: row.receiver_name,
            message: row.message,
            is_read: row.is_read,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let row: UserRow = sqlx::query_as(concat!(
            "INSERT INTO users (name, email, password_hash, phone, address, user_type, is_verified, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE) \
             RETURNING ",
            user_columns!()
        ))
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.phone)
        .bind(&user.address)
        .bind(user.user_type.as_str())
        .bind(user.is_verified)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to create user"))?;

        User::try_from(row)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(concat!("SELECT ", user_columns!(), " FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("Failed to get user"))?;

        into_user(row)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get user"))?;

        into_user(row)
    }

    async fn find_active_by_email(&self, email: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE lower(email) = lower($1) AND is_active"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get user"))?;

        into_user(row)
    }

    async fn find_active_user(&self, id: i64) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE id = $1 AND is_active"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get user"))?;

        into_user(row)
    }

    async fn update_user(&self, id: i64, update: &UserUpdate) -> Result<Option<User>> {
        let (is_verified, verified_by, verification_date) = match update.verification {
            Some(VerificationChange::Verified { by, at }) => (Some(true), Some(by), Some(at)),
            Some(VerificationChange::Unverified) => (Some(false), None, None),
            None => (None, None, None),
        };

        // Fixed statement: each column is either kept or replaced by its bind
        let row: Option<UserRow> = sqlx::query_as(concat!(
            "UPDATE users SET \
                name = COALESCE($2, name), \
                email = COALESCE($3, email), \
                phone = COALESCE($4, phone), \
                address = COALESCE($5, address), \
                barangay_id = COALESCE($6, barangay_id), \
                product_type = COALESCE($7, product_type), \
                verification_notes = COALESCE($8, verification_notes), \
                is_active = COALESCE($9, is_active), \
                is_verified = COALESCE($10, is_verified), \
                verified_by = CASE WHEN $10 IS NULL THEN verified_by ELSE $11 END, \
                verification_date = CASE WHEN $10 IS NULL THEN verification_date ELSE $12 END \
             WHERE id = $1 \
             RETURNING ",
            user_columns!()
        ))
        .bind(id)
        .bind(&update.name)
        .bind(&update.email)
        .bind(&update.phone)
        .bind(&update.address)
        .bind(&update.barangay_id)
        .bind(&update.product_type)
        .bind(&update.verification_notes)
        .bind(update.is_active)
        .bind(is_verified)
        .bind(verified_by)
        .bind(verification_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to update user"))?;

        into_user(row)
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>> {
        let rows: Vec<UserRow> = sqlx::query_as(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE ($1::TEXT IS NULL OR user_type = $1) \
              ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(filter.user_type.map(|t| t.as_str()))
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list users"))?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn count_users(&self, user_type: Option<UserType>, active_only: bool) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE ($1::TEXT IS NULL OR user_type = $1) AND (NOT $2 OR is_active)",
        )
        .bind(user_type.map(|t| t.as_str()))
        .bind(active_only)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to count users"))?;

        Ok(count)
    }
}

#[async_trait]
impl TokenRepository for PgStore {
    async fn insert_token(&self, token: NewToken) -> Result<TokenRecord> {
        let row: TokenRow = sqlx::query_as(
            "INSERT INTO user_tokens (user_id, token_hash, issued_at, expires_at) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, user_id, token_hash, issued_at, expires_at",
        )
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MarketError::Database(format!("Failed to store token: {e}")))?;

        Ok(row.into())
    }

    async fn find_user_by_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE is_active AND id = ( \
                SELECT user_id FROM user_tokens WHERE token_hash = $1 AND expires_at > $2 \
              )"
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to resolve token"))?;

        into_user(row)
    }

    async fn delete_token(&self, token_hash: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to revoke token"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM user_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to purge tokens"))?;

        tracing::debug!(removed = result.rows_affected(), "Purged expired tokens");
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AnnouncementRepository for PgStore {
    async fn create_announcement(&self, announcement: NewAnnouncement) -> Result<Announcement> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO announcements (admin_id, title, content, is_important) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(announcement.admin_id)
        .bind(&announcement.title)
        .bind(&announcement.content)
        .bind(announcement.is_important)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to create announcement"))?;

        self.find_announcement(id)
            .await?
            .ok_or_else(|| MarketError::NotFound(format!("Announcement {id}")))
    }

    async fn find_announcement(&self, id: i64) -> Result<Option<Announcement>> {
        let row: Option<AnnouncementRow> =
            sqlx::query_as(concat!(announcement_select!(), " WHERE a.id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("Failed to get announcement"))?;

        Ok(row.map(Announcement::from))
    }

    async fn list_announcements(
        &self,
        important_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Announcement>> {
        let rows: Vec<AnnouncementRow> = sqlx::query_as(concat!(
            announcement_select!(),
            " WHERE (NOT $1 OR a.is_important) \
              ORDER BY a.is_important DESC, a.created_at DESC, a.id DESC \
              LIMIT $2 OFFSET $3"
        ))
        .bind(important_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list announcements"))?;

        Ok(rows.into_iter().map(Announcement::from).collect())
    }

    async fn count_announcements(&self, important_only: bool) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM announcements WHERE (NOT $1 OR is_important)")
                .bind(important_only)
                .fetch_one(&self.pool)
                .await
                .map_err(db_error("Failed to count announcements"))?;

        Ok(count)
    }

    async fn update_announcement(
        &self,
        id: i64,
        update: &AnnouncementUpdate,
    ) -> Result<Option<Announcement>> {
        let updated: Option<i64> = sqlx::query_scalar(
            "UPDATE announcements SET \
                title = COALESCE($2, title), \
                content = COALESCE($3, content), \
                is_important = COALESCE($4, is_important), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING id",
        )
        .bind(id)
        .bind(&update.title)
        .bind(&update.content)
        .bind(update.is_important)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to update announcement"))?;

        match updated {
            Some(id) => self.find_announcement(id).await,
            None => Ok(None),
        }
    }

    async fn delete_announcement(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM announcements WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete announcement"))?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl MessageRepository for PgStore {
    async fn create_message(&self, message: NewMessage) -> Result<Message> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO messages (sender_id, receiver_id, message) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(message.sender_id)
        .bind(message.receiver_id)
        .bind(&message.message)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to send message"))?;

        let row: MessageRow = sqlx::query_as(concat!(message_select!(), " WHERE m.id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("Failed to load message"))?;

        Ok(row.into())
    }

    async fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(concat!(
            message_select!(),
            " WHERE (m.sender_id = $1 OR m.receiver_id = $1) \
              AND ($2::BIGINT IS NULL OR m.sender_id = $2 OR m.receiver_id = $2) \
              ORDER BY m.created_at DESC, m.id DESC \
              LIMIT $3 OFFSET $4"
        ))
        .bind(filter.user_id)
        .bind(filter.conversation_with)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list messages"))?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn mark_read(&self, id: i64, receiver_id: i64) -> Result<bool> {
        let result =
            sqlx::query("UPDATE messages SET is_read = TRUE WHERE id = $1 AND receiver_id = $2")
                .bind(id)
                .bind(receiver_id)
                .execute(&self.pool)
                .await
                .map_err(db_error("Failed to mark message read"))?;

        Ok(result.rows_affected() > 0)
    }
}
