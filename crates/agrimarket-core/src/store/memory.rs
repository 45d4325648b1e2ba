//! In-memory storage backend
//!
//! Mirrors the PostgreSQL schema constraints (unique email, token digest
//! uniqueness) so tests exercise the same invariants as production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{AnnouncementRepository, MessageRepository, TokenRepository, UserRepository};
use crate::{
    Announcement, AnnouncementUpdate, MarketError, Message, MessageFilter, NewAnnouncement,
    NewMessage, NewToken, NewUser, Result, TokenRecord, User, UserFilter, UserType, UserUpdate,
};

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<i64, User>,
    tokens: HashMap<String, TokenRecord>,
    announcements: BTreeMap<i64, Announcement>,
    messages: BTreeMap<i64, Message>,
    next_user_id: i64,
    next_token_id: i64,
    next_announcement_id: i64,
    next_message_id: i64,
}

impl MemoryState {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }

    fn with_admin_name(&self, mut announcement: Announcement) -> Announcement {
        announcement.admin_name = self
            .users
            .get(&announcement.admin_id)
            .map(|u| u.name.clone());
        announcement
    }

    fn with_participant_names(&self, mut message: Message) -> Message {
        message.sender_name = self.users.get(&message.sender_id).map(|u| u.name.clone());
        message.receiver_name = self.users.get(&message.receiver_id).map(|u| u.name.clone());
        message
    }
}

/// Process-local store backed by `tokio::sync::RwLock`
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tokens, expired ones included
    pub async fn token_count(&self) -> usize {
        self.state.read().await.tokens.len()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut state = self.state.write().await;

        if state.email_taken(&user.email, None) {
            return Err(MarketError::Conflict("Email already registered".to_string()));
        }

        state.next_user_id += 1;
        let record = User {
            id: state.next_user_id,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            phone: user.phone,
            address: user.address,
            user_type: user.user_type,
            is_verified: user.is_verified,
            is_active: true,
            barangay_id: None,
            product_type: None,
            verification_notes: None,
            verification_date: None,
            verified_by: None,
            created_at: Utc::now(),
        };
        state.users.insert(record.id, record.clone());

        Ok(record)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_active_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email == email && u.is_active)
            .cloned())
    }

    async fn find_active_user(&self, id: i64) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.get(&id).filter(|u| u.is_active).cloned())
    }

    async fn update_user(&self, id: i64, update: &UserUpdate) -> Result<Option<User>> {
        let mut state = self.state.write().await;

        if let Some(email) = &update.email {
            if state.email_taken(email, Some(id)) {
                return Err(MarketError::Conflict("Email already registered".to_string()));
            }
        }

        Ok(state.users.get_mut(&id).map(|user| {
            update.apply_to(user);
            user.clone()
        }))
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>> {
        let state = self.state.read().await;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| filter.user_type.map_or(true, |t| u.user_type == t))
            .cloned()
            .collect();

        // Newest first; ids break ties between rows created in the same instant
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(users
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn count_users(&self, user_type: Option<UserType>, active_only: bool) -> Result<i64> {
        let state = self.state.read().await;
        let count = state
            .users
            .values()
            .filter(|u| user_type.map_or(true, |t| u.user_type == t))
            .filter(|u| !active_only || u.is_active)
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl TokenRepository for MemoryStore {
    async fn insert_token(&self, token: NewToken) -> Result<TokenRecord> {
        let mut state = self.state.write().await;

        if state.tokens.contains_key(&token.token_hash) {
            return Err(MarketError::Conflict("Token already exists".to_string()));
        }

        state.next_token_id += 1;
        let record = TokenRecord {
            id: state.next_token_id,
            user_id: token.user_id,
            token_hash: token.token_hash,
            issued_at: token.issued_at,
            expires_at: token.expires_at,
        };
        state
            .tokens
            .insert(record.token_hash.clone(), record.clone());

        Ok(record)
    }

    async fn find_user_by_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>> {
        let state = self.state.read().await;

        let user = state
            .tokens
            .get(token_hash)
            .filter(|t| t.is_live_at(now))
            .and_then(|t| state.users.get(&t.user_id))
            .filter(|u| u.is_active)
            .cloned();

        Ok(user)
    }

    async fn delete_token(&self, token_hash: &str) -> Result<bool> {
        Ok(self.state.write().await.tokens.remove(token_hash).is_some())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.tokens.len();
        state.tokens.retain(|_, t| t.is_live_at(now));
        Ok((before - state.tokens.len()) as u64)
    }
}

#[async_trait]
impl AnnouncementRepository for MemoryStore {
    async fn create_announcement(&self, announcement: NewAnnouncement) -> Result<Announcement> {
        let mut state = self.state.write().await;

        state.next_announcement_id += 1;
        let now = Utc::now();
        let record = Announcement {
            id: state.next_announcement_id,
            admin_id: announcement.admin_id,
            admin_name: None,
            title: announcement.title,
            content: announcement.content,
            is_important: announcement.is_important,
            created_at: now,
            updated_at: now,
        };
        state.announcements.insert(record.id, record.clone());

        Ok(state.with_admin_name(record))
    }

    async fn find_announcement(&self, id: i64) -> Result<Option<Announcement>> {
        let state = self.state.read().await;
        Ok(state
            .announcements
            .get(&id)
            .cloned()
            .map(|a| state.with_admin_name(a)))
    }

    async fn list_announcements(
        &self,
        important_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Announcement>> {
        let state = self.state.read().await;
        let mut items: Vec<Announcement> = state
            .announcements
            .values()
            .filter(|a| !important_only || a.is_important)
            .cloned()
            .collect();

        items.sort_by(|a, b| {
            b.is_important
                .cmp(&a.is_important)
                .then(b.created_at.cmp(&a.created_at))
                .then(b.id.cmp(&a.id))
        });

        Ok(items
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|a| state.with_admin_name(a))
            .collect())
    }

    async fn count_announcements(&self, important_only: bool) -> Result<i64> {
        let state = self.state.read().await;
        let count = state
            .announcements
            .values()
            .filter(|a| !important_only || a.is_important)
            .count();
        Ok(count as i64)
    }

    async fn update_announcement(
        &self,
        id: i64,
        update: &AnnouncementUpdate,
    ) -> Result<Option<Announcement>> {
        let mut state = self.state.write().await;

        let updated = state.announcements.get_mut(&id).map(|a| {
            if let Some(title) = &update.title {
                a.title = title.clone();
            }
            if let Some(content) = &update.content {
                a.content = content.clone();
            }
            if let Some(important) = update.is_important {
                a.is_important = important;
            }
            a.updated_at = Utc::now();
            a.clone()
        });

        Ok(updated.map(|a| state.with_admin_name(a)))
    }

    async fn delete_announcement(&self, id: i64) -> Result<bool> {
        Ok(self.state.write().await.announcements.remove(&id).is_some())
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn create_message(&self, message: NewMessage) -> Result<Message> {
        let mut state = self.state.write().await;

        state.next_message_id += 1;
        let record = Message {
            id: state.next_message_id,
            sender_id: message.sender_id,
            sender_name: None,
            receiver_id: message.receiver_id,
            receiver_name: None,
            message: message.message,
            is_read: false,
            created_at: Utc::now(),
        };
        state.messages.insert(record.id, record.clone());

        Ok(state.with_participant_names(record))
    }

    async fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<Message>> {
        let state = self.state.read().await;
        let mut items: Vec<Message> = state
            .messages
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();

        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(items
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .map(|m| state.with_participant_names(m))
            .collect())
    }

    async fn mark_read(&self, id: i64, receiver_id: i64) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.messages.get_mut(&id) {
            Some(message) if message.receiver_id == receiver_id => {
                message.is_read = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
