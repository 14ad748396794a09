//! Shared setup for warden_core integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use warden_core::AuthServices;
use warden_core::config::AuthConfig;
use warden_core::models::auth::{
    AuthProvider, PlatformRole, User, UserIdentity, UserStatus,
};
use warden_core::store::CredentialStore;
use warden_core::store::memory::InMemoryStore;
use warden_core::uuid::new_id;

pub const SIGNING_KEY_PEM: &str = include_str!("../fixtures/signing_key.pem");

/// Legacy PBKDF2 hash of `pw123`.
pub const LEGACY_PW123: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90:f95b1230e974a2a4ac153c7e2e5d7bd14de99dff42c9cefa63b1579c6771dd9a6c4af069cd86086d4e81c7a1f6c0fbdeb3a18da7b0a5738c48eb9067b5532d1a";

pub fn config() -> AuthConfig {
    AuthConfig::new(SIGNING_KEY_PEM)
}

pub fn services() -> (Arc<InMemoryStore>, AuthServices) {
    let store = Arc::new(InMemoryStore::new());
    let services = AuthServices::new(store.clone(), &config()).expect("auth services");
    (store, services)
}

/// Insert an email user whose password is stored exactly as given.
pub async fn insert_email_user(
    store: &dyn CredentialStore,
    email: &str,
    stored_password: &str,
) -> User {
    let now = Utc::now();
    let user = User {
        id: new_id(),
        name: "Legacy User".into(),
        email: email.into(),
        email_verified: true,
        image: None,
        platform_id: None,
        platform_role: PlatformRole::Member,
        status: UserStatus::Active,
        created_at: now,
    };
    let identity = UserIdentity {
        id: new_id(),
        user_id: user.id.clone(),
        email: email.into(),
        password: Some(stored_password.into()),
        provider: AuthProvider::Email,
        token_version: 0,
        verified: true,
        created_at: now,
    };
    store
        .create_user_with_identity(user, identity)
        .await
        .expect("insert user")
        .0
}
