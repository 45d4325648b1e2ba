//! Application state management

use crate::auth::{AuthService, PasswordConfig};
use agrimarket_core::config::{AppConfig, StorageKind};
use agrimarket_core::{
    AnnouncementRepository, MemoryStore, MessageRepository, PgStore, TokenRepository,
    UserRepository,
};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// User accounts
    pub users: Arc<dyn UserRepository>,
    /// Announcements
    pub announcements: Arc<dyn AnnouncementRepository>,
    /// Direct messages
    pub messages: Arc<dyn MessageRepository>,
    /// Registration, login and token handling
    pub auth: AuthService,
}

impl AppState {
    /// Create state over a single backend implementing every repository
    pub fn new<S>(config: AppConfig, store: Arc<S>) -> Self
    where
        S: UserRepository
            + TokenRepository
            + AnnouncementRepository
            + MessageRepository
            + 'static,
    {
        let users: Arc<dyn UserRepository> = store.clone();
        let tokens: Arc<dyn TokenRepository> = store.clone();
        let announcements: Arc<dyn AnnouncementRepository> = store.clone();
        let messages: Arc<dyn MessageRepository> = store;
        let auth = AuthService::new(users.clone(), tokens, &config.auth);

        Self {
            config,
            start_time: Instant::now(),
            users,
            announcements,
            messages,
            auth,
        }
    }

    /// Connect the backend selected by `config.database.storage`
    pub async fn connect(config: AppConfig) -> anyhow::Result<Self> {
        match config.database.storage {
            StorageKind::Postgres => {
                let store =
                    PgStore::connect(&config.database.postgres_url, config.database.pool_size)
                        .await?;
                tracing::info!(pool_size = config.database.pool_size, "Using PostgreSQL storage");
                Ok(Self::new(config, Arc::new(store)))
            }
            StorageKind::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                Ok(Self::new(config, Arc::new(MemoryStore::new())))
            }
        }
    }

    /// In-memory state with cheap password hashing
    #[cfg(any(test, feature = "test-utils"))]
    pub fn for_testing(config: AppConfig) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()))
            .with_password_config(PasswordConfig::for_testing())
    }

    /// Replace the Argon2 cost parameters
    pub fn with_password_config(mut self, config: PasswordConfig) -> Self {
        self.auth = self.auth.with_password_config(config);
        self
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
