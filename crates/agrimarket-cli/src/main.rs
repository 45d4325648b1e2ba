//! Agri-Market CLI - operator tools
//!
//! Usage:
//!   agrimarket create-admin --name <name> --email <email> --phone <phone> --password <password>
//!   agrimarket purge-tokens
//!   agrimarket hash-password <password>

use agrimarket_api::auth::{PasswordConfig, PasswordHasher};
use agrimarket_api::state::AppState;
use agrimarket_api::validation::validate_email;
use agrimarket_core::{AppConfig, NewUser, UserType};
use anyhow::{anyhow, bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agrimarket")]
#[command(about = "Agri-Market operator CLI")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a verified administrator account
    CreateAdmin {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "")]
        address: String,
    },
    /// Delete expired bearer tokens
    PurgeTokens,
    /// Print the Argon2id digest of a password
    HashPassword { password: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::CreateAdmin {
            name,
            email,
            phone,
            password,
            address,
        } => create_admin(config, name, email, phone, password, address).await,
        Commands::PurgeTokens => {
            let state = AppState::connect(config).await?;
            let removed = state.auth.tokens().purge_expired(Utc::now()).await?;
            tracing::info!(removed, "Purged expired tokens");
            println!("Removed {removed} expired token(s)");
            Ok(())
        }
        Commands::HashPassword { password } => {
            let hasher = PasswordHasher::new(PasswordConfig::from(&config.auth));
            println!("{}", hasher.hash(&password)?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::from_file(path.clone())
            .with_context(|| format!("loading {}", path.display())),
        None => AppConfig::from_env().context("loading configuration from environment"),
    }
}

async fn create_admin(
    config: AppConfig,
    name: String,
    email: String,
    phone: String,
    password: String,
    address: String,
) -> anyhow::Result<()> {
    let email = validate_email(&email).map_err(|e| anyhow!("{e}"))?;
    if name.trim().is_empty() || phone.trim().is_empty() {
        bail!("Name and phone are required");
    }
    let min_length = config.auth.password_min_length;
    if password.chars().count() < min_length {
        bail!("Password must be at least {min_length} characters long");
    }

    let state = AppState::connect(config).await?;
    if state.users.find_by_email(&email).await?.is_some() {
        bail!("Email already registered");
    }

    let password_hash = state.auth.hasher().hash_blocking(password).await?;
    let admin = state
        .users
        .create_user(NewUser {
            name: name.trim().to_string(),
            email,
            password_hash,
            phone: phone.trim().to_string(),
            address: address.trim().to_string(),
            user_type: UserType::Admin,
            is_verified: true,
        })
        .await?;

    tracing::info!(user_id = admin.id, email = %admin.email, "Administrator created");
    println!("Created administrator {} (id {})", admin.email, admin.id);
    Ok(())
}
