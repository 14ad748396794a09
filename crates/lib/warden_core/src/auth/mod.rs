//! Authentication primitives.
//!
//! Password hashing with legacy migration, per-platform signing keys and
//! JWT issuance/verification. Shared by `identity`, `session` and `warden_api`.

pub mod jwt;
pub mod keys;
pub mod password;

use thiserror::Error;

use crate::store::StoreError;

/// Authentication errors.
///
/// Token *verification* never produces one of these for a bad token; it
/// yields `Ok(None)` instead. What remains here is either a user-facing
/// credential problem or an infrastructure failure.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    CredentialError,

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}
