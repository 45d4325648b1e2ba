//! Agri-Market Configuration Management
//!
//! Handles configuration from environment variables and TOML files
//! with sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Longest accepted token lifetime (one leap year)
pub const MAX_TOKEN_TTL_HOURS: u32 = 366 * 24;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Storage backend configuration
    pub database: DatabaseConfig,

    /// Authentication policy
    pub auth: AuthConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("API_PORT") {
            config.server.port = parse_var("API_PORT", port)?;
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            config.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Storage
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.postgres_url = url;
            config.database.storage = StorageKind::Postgres;
        }
        if let Ok(size) = std::env::var("DATABASE_POOL_SIZE") {
            config.database.pool_size = parse_var("DATABASE_POOL_SIZE", size)?;
        }
        if let Ok(storage) = std::env::var("STORAGE") {
            config.database.storage = storage.parse()?;
        }

        // Auth
        if let Ok(hours) = std::env::var("TOKEN_TTL_HOURS") {
            config.auth.token_ttl_hours = parse_var("TOKEN_TTL_HOURS", hours)?;
        }
        if let Ok(allow) = std::env::var("ALLOW_ADMIN_SELF_REGISTRATION") {
            config.auth.allow_admin_self_registration =
                parse_var("ALLOW_ADMIN_SELF_REGISTRATION", allow)?;
        }
        if let Ok(len) = std::env::var("PASSWORD_MIN_LENGTH") {
            config.auth.password_min_length = parse_var("PASSWORD_MIN_LENGTH", len)?;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.logging.json_format = format.eq_ignore_ascii_case("json");
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.token_ttl_hours == 0 || self.auth.token_ttl_hours > MAX_TOKEN_TTL_HOURS {
            return Err(ConfigError::InvalidValue {
                key: "TOKEN_TTL_HOURS".to_string(),
                value: self.auth.token_ttl_hours.to_string(),
            });
        }
        if self.database.storage == StorageKind::Postgres && self.database.postgres_url.is_empty()
        {
            return Err(ConfigError::MissingRequired("DATABASE_URL".to_string()));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Maximum request body size in bytes
    pub max_body_size: usize,

    /// Allowed origins for CORS (empty means any origin)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_size: 1024 * 1024, // 1MB
            cors_origins: vec![],
        }
    }
}

/// Which storage backend the server uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Postgres,
    Memory,
}

impl std::str::FromStr for StorageKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::InvalidValue {
                key: "STORAGE".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Storage connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Selected backend
    pub storage: StorageKind,

    /// PostgreSQL connection URL
    pub postgres_url: String,

    /// PostgreSQL connection pool size
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            storage: StorageKind::Memory,
            postgres_url: String::new(),
            pool_size: 10,
        }
    }
}

/// Authentication policy and password hashing cost
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer token lifetime in hours
    pub token_ttl_hours: u32,

    /// Let anonymous callers register `admin` accounts
    pub allow_admin_self_registration: bool,

    /// Minimum password length at registration
    pub password_min_length: usize,

    /// Argon2 memory cost in KiB
    pub argon2_memory_kib: u32,

    /// Argon2 iterations
    pub argon2_iterations: u32,

    /// Argon2 lanes
    pub argon2_parallelism: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_hours: 24,
            allow_admin_self_registration: false,
            password_min_length: 6,
            argon2_memory_kib: 19456, // 19 MiB
            argon2_iterations: 2,
            argon2_parallelism: 1,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.token_ttl_hours, 24);
        assert_eq!(config.auth.password_min_length, 6);
        assert!(!config.auth.allow_admin_self_registration);
        assert_eq!(config.database.storage, StorageKind::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_token_ttl_bounds() {
        let mut config = AppConfig::default();

        config.auth.token_ttl_hours = MAX_TOKEN_TTL_HOURS;
        assert!(config.validate().is_ok());

        for ttl in [0, MAX_TOKEN_TTL_HOURS + 1, u32::MAX] {
            config.auth.token_ttl_hours = ttl;
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidValue { ref key, .. }) if key == "TOKEN_TTL_HOURS"
            ));
        }
    }

    #[test]
    fn test_storage_kind_parse() {
        assert_eq!("postgres".parse::<StorageKind>().unwrap(), StorageKind::Postgres);
        assert_eq!("Memory".parse::<StorageKind>().unwrap(), StorageKind::Memory);
        assert!("mysql".parse::<StorageKind>().is_err());
    }

    #[test]
    fn test_postgres_requires_url() {
        let mut config = AppConfig::default();
        config.database.storage = StorageKind::Postgres;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(_))
        ));
    }

    #[test]
    fn test_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [auth]
            token_ttl_hours = 12
            allow_admin_self_registration = true

            [server]
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(config.auth.token_ttl_hours, 12);
        assert!(config.auth.allow_admin_self_registration);
        assert_eq!(config.auth.password_min_length, 6);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut config = AppConfig::default();
        config.auth.token_ttl_hours = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
