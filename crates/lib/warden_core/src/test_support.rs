//! Shared fixtures for unit tests.

use std::sync::Arc;

use chrono::Utc;

use crate::auth::jwt::TokenService;
use crate::auth::password::hash_password;
use crate::config::AuthConfig;
use crate::identity::IdentityService;
use crate::models::auth::{
    AuthProvider, Platform, PlatformRole, User, UserIdentity, UserStatus,
};
use crate::store::memory::InMemoryStore;
use crate::store::{CredentialStore, KeyStore};
use crate::uuid::new_id;

pub(crate) const SIGNING_KEY_PEM: &str = include_str!("../tests/fixtures/signing_key.pem");
pub(crate) const OTHER_SIGNING_KEY_PEM: &str =
    include_str!("../tests/fixtures/other_signing_key.pem");

pub(crate) const PASSWORD: &str = "correct horse";

/// Legacy PBKDF2 hash of `pw123`.
pub(crate) const LEGACY_PW123: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90:f95b1230e974a2a4ac153c7e2e5d7bd14de99dff42c9cefa63b1579c6771dd9a6c4af069cd86086d4e81c7a1f6c0fbdeb3a18da7b0a5738c48eb9067b5532d1a";

pub(crate) fn config() -> AuthConfig {
    AuthConfig::new(SIGNING_KEY_PEM)
}

pub(crate) fn token_service(store: &Arc<InMemoryStore>, config: &AuthConfig) -> TokenService {
    TokenService::new(config, store.clone(), store.clone()).unwrap()
}

pub(crate) fn identity_service(
    store: &Arc<InMemoryStore>,
    config: &AuthConfig,
) -> (IdentityService, Arc<TokenService>) {
    let tokens = Arc::new(token_service(store, config));
    let identity = IdentityService::new(store.clone(), store.clone(), tokens.clone(), config);
    (identity, tokens)
}

pub(crate) struct Seeded {
    pub platform: Platform,
    pub user: User,
    pub identity: UserIdentity,
}

/// Default platform with a registered key, plus one email user on it.
pub(crate) async fn seed_account(
    store: &Arc<InMemoryStore>,
    tokens: &TokenService,
    email: &str,
) -> Seeded {
    let platform = store
        .create_default_platform(Platform {
            id: new_id(),
            name: "Test Platform".into(),
            owner_id: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    store
        .add_signing_key(tokens.signer().signing_key_for(&platform.id, &platform.name))
        .await
        .unwrap();

    let now = Utc::now();
    let user = User {
        id: new_id(),
        name: "Test User".into(),
        email: email.into(),
        email_verified: false,
        image: None,
        platform_id: Some(platform.id.clone()),
        platform_role: PlatformRole::Member,
        status: UserStatus::Active,
        created_at: now,
    };
    let identity = UserIdentity {
        id: new_id(),
        user_id: user.id.clone(),
        email: email.into(),
        password: Some(hash_password(PASSWORD).unwrap()),
        provider: AuthProvider::Email,
        token_version: 0,
        verified: false,
        created_at: now,
    };
    let (user, identity) = store.create_user_with_identity(user, identity).await.unwrap();
    Seeded {
        platform,
        user,
        identity,
    }
}
