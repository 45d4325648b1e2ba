//! Opaque bearer tokens
//!
//! A token is 32 random bytes rendered as unpadded base64url. Only its SHA-256
//! digest reaches storage. Expiry is evaluated when a token is resolved.

use agrimarket_core::{MarketError, NewToken, Result, TokenRepository, User};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use utoipa::ToSchema;

/// A freshly issued token, returned to the client exactly once
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issue, resolve and revoke bearer tokens
#[derive(Clone)]
pub struct TokenStore {
    repo: Arc<dyn TokenRepository>,
    ttl: Duration,
}

impl TokenStore {
    pub fn new(repo: Arc<dyn TokenRepository>, ttl: Duration) -> Self {
        Self { repo, ttl }
    }

    /// Token lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `user_id`, valid from now for the configured lifetime
    pub async fn issue(&self, user_id: i64) -> Result<IssuedToken> {
        self.issue_at(user_id, Utc::now()).await
    }

    /// Issue a token as if the current time were `now`
    pub async fn issue_at(&self, user_id: i64, now: DateTime<Utc>) -> Result<IssuedToken> {
        let expires_at = now.checked_add_signed(self.ttl).ok_or_else(|| {
            MarketError::Config(format!("Token lifetime {} overflows the clock", self.ttl))
        })?;

        let token = generate_token();
        let record = self
            .repo
            .insert_token(NewToken {
                user_id,
                token_hash: hash_token(&token),
                issued_at: now,
                expires_at,
            })
            .await?;

        Ok(IssuedToken {
            token,
            expires_at: record.expires_at,
        })
    }

    /// Resolve a token to its owner at the current time
    pub async fn resolve(&self, token: &str) -> Result<Option<User>> {
        self.resolve_at(token, Utc::now()).await
    }

    /// Resolve a token to its owner as of `now`.
    ///
    /// `None` when the token is unknown, `now >= expires_at`, or the owner is
    /// deactivated.
    pub async fn resolve_at(&self, token: &str, now: DateTime<Utc>) -> Result<Option<User>> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }
        self.repo.find_user_by_token(&hash_token(token), now).await
    }

    /// Delete a token; returns whether it existed
    pub async fn revoke(&self, token: &str) -> Result<bool> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(false);
        }
        self.repo.delete_token(&hash_token(token)).await
    }

    /// Delete all tokens expired as of `now`
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let removed = self.repo.delete_expired(now).await?;
        tracing::info!(removed, "Purged expired tokens");
        Ok(removed)
    }
}

/// Generate a cryptographically secure token value
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let token_bytes: [u8; 32] = rng.gen();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(token_bytes)
}

/// Storage digest of a token value (SHA-256, lowercase hex)
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrimarket_core::{MemoryStore, NewUser, UserRepository, UserType, UserUpdate};

    async fn setup() -> (Arc<MemoryStore>, TokenStore, User) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .create_user(NewUser {
                name: "Ana".to_string(),
                email: "ana@x.com".to_string(),
                password_hash: "digest".to_string(),
                phone: "111".to_string(),
                address: String::new(),
                user_type: UserType::Farmer,
                is_verified: false,
            })
            .await
            .unwrap();
        let tokens = TokenStore::new(store.clone(), Duration::hours(24));
        (store, tokens, user)
    }

    #[test]
    fn test_generated_token_shape() {
        let token = generate_token();
        // 32 bytes -> 43 base64url characters without padding
        assert_eq!(token.len(), 43);
        assert!(!token.contains('='));
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_hash_token_is_sha256_hex() {
        let digest = hash_token("abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_issue_then_resolve() {
        let (_store, tokens, user) = setup().await;
        let issued = tokens.issue(user.id).await.unwrap();

        let resolved = tokens.resolve(&issued.token).await.unwrap();
        assert_eq!(resolved.map(|u| u.id), Some(user.id));
    }

    #[tokio::test]
    async fn test_expiry_boundary() {
        let (_store, tokens, user) = setup().await;
        let issued_at = Utc::now();
        let issued = tokens.issue_at(user.id, issued_at).await.unwrap();
        assert_eq!(issued.expires_at, issued_at + Duration::hours(24));

        let before = issued.expires_at - Duration::seconds(1);
        let after = issued.expires_at + Duration::seconds(1);
        assert!(tokens.resolve_at(&issued.token, before).await.unwrap().is_some());
        assert!(tokens.resolve_at(&issued.token, issued.expires_at).await.unwrap().is_none());
        assert!(tokens.resolve_at(&issued.token, after).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overflowing_lifetime_is_an_error() {
        let (store, _tokens, user) = setup().await;
        let tokens = TokenStore::new(store.clone(), Duration::hours(i64::from(u32::MAX)));

        let err = tokens.issue(user.id).await.unwrap_err();
        assert!(matches!(err, MarketError::Config(_)));
        assert_eq!(store.token_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_tokens_are_distinct_and_valid() {
        let (_store, tokens, user) = setup().await;
        let first = tokens.issue(user.id).await.unwrap();
        let second = tokens.issue(user.id).await.unwrap();

        assert_ne!(first.token, second.token);
        assert!(tokens.resolve(&first.token).await.unwrap().is_some());
        assert!(tokens.resolve(&second.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_deactivation_invalidates_token() {
        let (store, tokens, user) = setup().await;
        let issued = tokens.issue(user.id).await.unwrap();

        store
            .update_user(
                user.id,
                &UserUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(tokens.resolve(&issued.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke() {
        let (_store, tokens, user) = setup().await;
        let issued = tokens.issue(user.id).await.unwrap();

        assert!(tokens.revoke(&issued.token).await.unwrap());
        assert!(tokens.resolve(&issued.token).await.unwrap().is_none());
        assert!(!tokens.revoke(&issued.token).await.unwrap());
        assert!(!tokens.revoke("").await.unwrap());
    }

    #[tokio::test]
    async fn test_garbage_tokens_resolve_to_none() {
        let (_store, tokens, _user) = setup().await;
        for garbage in ["", "   ", "not-a-token", "Bearer ", "\u{0}\u{1}"] {
            assert!(tokens.resolve(garbage).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_plaintext_never_stored() {
        let (store, tokens, user) = setup().await;
        let issued = tokens.issue(user.id).await.unwrap();

        // Presenting the digest itself must not authenticate
        let digest = hash_token(&issued.token);
        assert!(tokens.resolve(&digest).await.unwrap().is_none());
        assert_eq!(store.token_count().await, 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (store, tokens, user) = setup().await;
        let now = Utc::now();
        tokens.issue_at(user.id, now - Duration::hours(48)).await.unwrap();
        let live = tokens.issue_at(user.id, now).await.unwrap();

        assert_eq!(tokens.purge_expired(now).await.unwrap(), 1);
        assert_eq!(store.token_count().await, 1);
        assert!(tokens.resolve_at(&live.token, now).await.unwrap().is_some());
    }
}
