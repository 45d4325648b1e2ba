//! Authentication and authorization module
//!
//! Opaque bearer tokens with the following components:
//! - Password hashing with Argon2id
//! - Token issuance, resolution and revocation
//! - Authentication service for registration, login, validation and logout
//! - Request context middleware resolving the caller's principal

pub mod middleware;
pub mod password;
pub mod service;
pub mod token;

pub use middleware::{request_context_middleware, Principal, RequestContext};
pub use password::{PasswordConfig, PasswordError, PasswordHasher};
pub use service::{AuthResponse, AuthService, LoginRequest, RegisterRequest};
pub use token::{generate_token, hash_token, IssuedToken, TokenStore};
