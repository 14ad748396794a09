//! # warden_core
//!
//! Core authentication logic for Warden: password credentials, tenant-signed
//! session tokens, identity resolution and session lookup.

pub mod auth;
pub mod config;
pub mod identity;
pub mod migrate;
pub mod models;
pub mod session;
pub mod store;
pub mod uuid;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use auth::AuthError;
use auth::jwt::TokenService;
use config::AuthConfig;
use identity::IdentityService;
use session::SessionFacade;
use store::{CredentialStore, KeyStore};

/// Token, identity and session services wired over one store.
#[derive(Clone)]
pub struct AuthServices {
    pub tokens: Arc<TokenService>,
    pub identity: Arc<IdentityService>,
    pub sessions: Arc<SessionFacade>,
}

impl AuthServices {
    /// Fails only if the configured private key cannot be loaded.
    pub fn new<S>(store: Arc<S>, config: &AuthConfig) -> Result<Self, AuthError>
    where
        S: CredentialStore + KeyStore + 'static,
    {
        let tokens = Arc::new(TokenService::new(config, store.clone(), store.clone())?);
        let identity = Arc::new(IdentityService::new(
            store.clone(),
            store.clone(),
            tokens.clone(),
            config,
        ));
        let sessions = Arc::new(SessionFacade::new(tokens.clone(), store));
        Ok(Self {
            tokens,
            identity,
            sessions,
        })
    }
}

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
