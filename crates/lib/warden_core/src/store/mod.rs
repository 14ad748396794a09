//! Credential and key storage.
//!
//! The relational store is consumed through two narrow traits so the auth
//! flows can run against PostgreSQL in production and an in-memory backend in
//! tests. Both backends enforce the same uniqueness rules and report
//! violations as [`StoreError::Conflict`]; callers rely on that to resolve
//! races (duplicate sign-ups, concurrent default-project creation).

use async_trait::async_trait;
use thiserror::Error;

use crate::models::auth::{
    AuthProvider, Platform, Project, ProjectMember, SigningKey, User, UserIdentity,
};

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable user, identity, platform and project records.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_id(&self, user_id: &str) -> StoreResult<Option<User>>;

    /// Insert a user and its first identity as one unit.
    ///
    /// Fails with `Conflict` if the email is already registered; in that case
    /// neither row is written.
    async fn create_user_with_identity(
        &self,
        user: User,
        identity: UserIdentity,
    ) -> StoreResult<(User, UserIdentity)>;
    async fn set_user_image(&self, user_id: &str, image: &str) -> StoreResult<()>;
    async fn set_user_platform(&self, user_id: &str, platform_id: &str) -> StoreResult<()>;

    async fn find_identity(
        &self,
        user_id: &str,
        provider: AuthProvider,
    ) -> StoreResult<Option<UserIdentity>>;
    /// Fails with `Conflict` if the user already has an identity for the provider.
    async fn create_identity(&self, identity: UserIdentity) -> StoreResult<UserIdentity>;
    async fn set_identity_password(&self, identity_id: &str, password: &str) -> StoreResult<()>;

    /// Current revocation counter, read from the primary identity: the
    /// user's earliest (ties broken by id).
    async fn token_version(&self, user_id: &str) -> StoreResult<Option<i32>>;
    /// Bump the counter on every identity of the user; returns the new primary value.
    ///
    /// `NotFound` if the user has no identities.
    async fn increment_token_version(&self, user_id: &str) -> StoreResult<i32>;

    async fn first_platform(&self) -> StoreResult<Option<Platform>>;
    async fn find_platform(&self, platform_id: &str) -> StoreResult<Option<Platform>>;
    /// Insert `platform` unless a platform already exists, returning whichever
    /// platform is first afterwards.
    async fn create_default_platform(&self, platform: Platform) -> StoreResult<Platform>;
    async fn set_platform_owner_if_unset(&self, platform_id: &str, user_id: &str)
    -> StoreResult<()>;

    async fn find_default_project(
        &self,
        owner_id: &str,
        platform_id: &str,
    ) -> StoreResult<Option<Project>>;
    /// Insert a default project and its owner membership as one unit.
    ///
    /// Fails with `Conflict` if the owner already has a default project on
    /// that platform.
    async fn create_default_project(
        &self,
        project: Project,
        member: ProjectMember,
    ) -> StoreResult<Project>;
}

/// Per-platform public signing keys.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn public_key(&self, platform_id: &str) -> StoreResult<Option<SigningKey>>;
    /// Register a key; a platform that already has one keeps it.
    async fn add_signing_key(&self, key: SigningKey) -> StoreResult<()>;
}
