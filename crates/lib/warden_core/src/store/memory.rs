//! In-memory implementation of the credential and key stores.
//!
//! # Purpose
//! Backs tests and local development without a database. It implements the
//! same contracts as [`super::postgres::PgStore`], including the uniqueness
//! rules the auth flows depend on to resolve races.
//!
//! # Consistency
//! All tables sit behind a single `tokio::sync::RwLock`, so every multi-row
//! write (user + identity, project + membership) is atomic and every
//! check-then-insert happens under one write lock. Not durable.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CredentialStore, KeyStore, StoreError, StoreResult};
use crate::models::auth::{
    AuthProvider, Platform, Project, ProjectMember, SigningKey, User, UserIdentity,
};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<String, User>,
    /// email → user id
    users_by_email: HashMap<String, String>,
    identities: HashMap<String, UserIdentity>,
    /// Insertion order; the first entry is the default platform.
    platforms: Vec<Platform>,
    signing_keys: HashMap<String, SigningKey>,
    projects: HashMap<String, Project>,
    /// (owner id, platform id) → default project id
    default_projects: HashMap<(String, String), String>,
    members: Vec<ProjectMember>,
}

impl Tables {
    fn primary_identity(&self, user_id: &str) -> Option<&UserIdentity> {
        self.identities
            .values()
            .filter(|i| i.user_id == user_id)
            .min_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)))
    }
}

/// In-memory store. Cheap to construct; wrap in `Arc` to share.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Inspection helpers, mostly for tests.

    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }

    pub async fn platform_count(&self) -> usize {
        self.tables.read().await.platforms.len()
    }

    pub async fn identities_for(&self, user_id: &str) -> Vec<UserIdentity> {
        let tables = self.tables.read().await;
        let mut identities: Vec<_> = tables
            .identities
            .values()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        identities.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        identities
    }

    pub async fn projects_owned_by(&self, user_id: &str) -> Vec<Project> {
        self.tables
            .read()
            .await
            .projects
            .values()
            .filter(|p| p.owner_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn members_of(&self, project_id: &str) -> Vec<ProjectMember> {
        self.tables
            .read()
            .await
            .members
            .iter()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users_by_email
            .get(email)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: &str) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(user_id).cloned())
    }

    async fn create_user_with_identity(
        &self,
        user: User,
        identity: UserIdentity,
    ) -> StoreResult<(User, UserIdentity)> {
        let mut tables = self.tables.write().await;
        if tables.users_by_email.contains_key(&user.email) {
            return Err(StoreError::Conflict(format!("email {} exists", user.email)));
        }
        if tables.users.contains_key(&user.id) || tables.identities.contains_key(&identity.id) {
            return Err(StoreError::Conflict("duplicate id".into()));
        }
        tables
            .users_by_email
            .insert(user.email.clone(), user.id.clone());
        tables.users.insert(user.id.clone(), user.clone());
        tables
            .identities
            .insert(identity.id.clone(), identity.clone());
        Ok((user, identity))
    }

    async fn set_user_image(&self, user_id: &str, image: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        user.image = Some(image.to_string());
        Ok(())
    }

    async fn set_user_platform(&self, user_id: &str, platform_id: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        user.platform_id = Some(platform_id.to_string());
        Ok(())
    }

    async fn find_identity(
        &self,
        user_id: &str,
        provider: AuthProvider,
    ) -> StoreResult<Option<UserIdentity>> {
        Ok(self
            .tables
            .read()
            .await
            .identities
            .values()
            .find(|i| i.user_id == user_id && i.provider == provider)
            .cloned())
    }

    async fn create_identity(&self, identity: UserIdentity) -> StoreResult<UserIdentity> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&identity.user_id) {
            return Err(StoreError::NotFound(format!("user {}", identity.user_id)));
        }
        let exists = tables
            .identities
            .values()
            .any(|i| i.user_id == identity.user_id && i.provider == identity.provider);
        if exists || tables.identities.contains_key(&identity.id) {
            return Err(StoreError::Conflict(format!(
                "{} identity exists for user {}",
                identity.provider, identity.user_id
            )));
        }
        tables
            .identities
            .insert(identity.id.clone(), identity.clone());
        Ok(identity)
    }

    async fn set_identity_password(&self, identity_id: &str, password: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let identity = tables
            .identities
            .get_mut(identity_id)
            .ok_or_else(|| StoreError::NotFound(format!("identity {identity_id}")))?;
        identity.password = Some(password.to_string());
        Ok(())
    }

    async fn token_version(&self, user_id: &str) -> StoreResult<Option<i32>> {
        Ok(self
            .tables
            .read()
            .await
            .primary_identity(user_id)
            .map(|i| i.token_version))
    }

    async fn increment_token_version(&self, user_id: &str) -> StoreResult<i32> {
        let mut tables = self.tables.write().await;
        let mut touched = false;
        for identity in tables
            .identities
            .values_mut()
            .filter(|i| i.user_id == user_id)
        {
            identity.token_version += 1;
            touched = true;
        }
        if !touched {
            return Err(StoreError::NotFound(format!("identities for user {user_id}")));
        }
        tables
            .primary_identity(user_id)
            .map(|i| i.token_version)
            .ok_or_else(|| StoreError::NotFound(format!("identities for user {user_id}")))
    }

    async fn first_platform(&self) -> StoreResult<Option<Platform>> {
        Ok(self.tables.read().await.platforms.first().cloned())
    }

    async fn find_platform(&self, platform_id: &str) -> StoreResult<Option<Platform>> {
        Ok(self
            .tables
            .read()
            .await
            .platforms
            .iter()
            .find(|p| p.id == platform_id)
            .cloned())
    }

    async fn create_default_platform(&self, platform: Platform) -> StoreResult<Platform> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.platforms.first() {
            return Ok(existing.clone());
        }
        tables.platforms.push(platform.clone());
        Ok(platform)
    }

    async fn set_platform_owner_if_unset(
        &self,
        platform_id: &str,
        user_id: &str,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let platform = tables
            .platforms
            .iter_mut()
            .find(|p| p.id == platform_id)
            .ok_or_else(|| StoreError::NotFound(format!("platform {platform_id}")))?;
        if platform.owner_id.is_none() {
            platform.owner_id = Some(user_id.to_string());
        }
        Ok(())
    }

    async fn find_default_project(
        &self,
        owner_id: &str,
        platform_id: &str,
    ) -> StoreResult<Option<Project>> {
        let tables = self.tables.read().await;
        Ok(tables
            .default_projects
            .get(&(owner_id.to_string(), platform_id.to_string()))
            .and_then(|id| tables.projects.get(id))
            .cloned())
    }

    async fn create_default_project(
        &self,
        project: Project,
        member: ProjectMember,
    ) -> StoreResult<Project> {
        let mut tables = self.tables.write().await;
        let key = (project.owner_id.clone(), project.platform_id.clone());
        if tables.default_projects.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "default project exists for user {} on platform {}",
                project.owner_id, project.platform_id
            )));
        }
        tables.default_projects.insert(key, project.id.clone());
        tables.projects.insert(project.id.clone(), project.clone());
        tables.members.push(member);
        Ok(project)
    }
}

#[async_trait]
impl KeyStore for InMemoryStore {
    async fn public_key(&self, platform_id: &str) -> StoreResult<Option<SigningKey>> {
        Ok(self
            .tables
            .read()
            .await
            .signing_keys
            .get(platform_id)
            .cloned())
    }

    async fn add_signing_key(&self, key: SigningKey) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .signing_keys
            .entry(key.platform_id.clone())
            .or_insert(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::{PlatformRole, ProjectRole, UserStatus};
    use chrono::{Duration, Utc};

    fn user(id: &str, email: &str) -> User {
        User {
            id: id.into(),
            name: "Ann".into(),
            email: email.into(),
            email_verified: true,
            image: None,
            platform_id: None,
            platform_role: PlatformRole::Member,
            status: UserStatus::Active,
            created_at: Utc::now(),
        }
    }

    fn identity(id: &str, user_id: &str, provider: AuthProvider) -> UserIdentity {
        UserIdentity {
            id: id.into(),
            user_id: user_id.into(),
            email: "a@x.com".into(),
            password: None,
            provider,
            token_version: 0,
            verified: true,
            created_at: Utc::now(),
        }
    }

    fn project(id: &str, owner: &str) -> (Project, ProjectMember) {
        let now = Utc::now();
        (
            Project {
                id: id.into(),
                owner_id: owner.into(),
                platform_id: "plat".into(),
                display_name: "Ann's Project".into(),
                created_at: now,
            },
            ProjectMember {
                id: format!("m-{id}"),
                project_id: id.into(),
                user_id: owner.into(),
                platform_id: "plat".into(),
                role: ProjectRole::Admin,
                created_at: now,
            },
        )
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict_and_writes_nothing() {
        let store = InMemoryStore::new();
        store
            .create_user_with_identity(user("u1", "a@x.com"), identity("i1", "u1", AuthProvider::Email))
            .await
            .unwrap();
        let err = store
            .create_user_with_identity(user("u2", "a@x.com"), identity("i2", "u2", AuthProvider::Email))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.user_count().await, 1);
        assert!(store.identities_for("u2").await.is_empty());
    }

    #[tokio::test]
    async fn one_identity_per_provider() {
        let store = InMemoryStore::new();
        store
            .create_user_with_identity(user("u1", "a@x.com"), identity("i1", "u1", AuthProvider::Email))
            .await
            .unwrap();
        store
            .create_identity(identity("i2", "u1", AuthProvider::Github))
            .await
            .unwrap();
        let err = store
            .create_identity(identity("i3", "u1", AuthProvider::Github))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.identities_for("u1").await.len(), 2);
    }

    #[tokio::test]
    async fn increment_bumps_every_identity() {
        let store = InMemoryStore::new();
        let mut first = identity("i1", "u1", AuthProvider::Email);
        first.created_at = Utc::now() - Duration::minutes(5);
        store
            .create_user_with_identity(user("u1", "a@x.com"), first)
            .await
            .unwrap();
        store
            .create_identity(identity("i2", "u1", AuthProvider::Google))
            .await
            .unwrap();

        assert_eq!(store.increment_token_version("u1").await.unwrap(), 1);
        assert_eq!(store.token_version("u1").await.unwrap(), Some(1));
        assert!(
            store
                .identities_for("u1")
                .await
                .iter()
                .all(|i| i.token_version == 1)
        );
        let tables = store.tables.read().await;
        assert_eq!(tables.primary_identity("u1").map(|i| i.id.as_str()), Some("i1"));
    }

    #[tokio::test]
    async fn increment_without_identities_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.increment_token_version("ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn default_platform_is_created_once() {
        let store = InMemoryStore::new();
        let platform = |id: &str| Platform {
            id: id.into(),
            name: "Default Platform".into(),
            owner_id: None,
            created_at: Utc::now(),
        };
        let a = store.create_default_platform(platform("p1")).await.unwrap();
        let b = store.create_default_platform(platform("p2")).await.unwrap();
        assert_eq!(a.id, "p1");
        assert_eq!(b.id, "p1");
        assert_eq!(store.platform_count().await, 1);

        store.set_platform_owner_if_unset("p1", "u1").await.unwrap();
        store.set_platform_owner_if_unset("p1", "u2").await.unwrap();
        let p = store.find_platform("p1").await.unwrap().unwrap();
        assert_eq!(p.owner_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn second_default_project_conflicts() {
        let store = InMemoryStore::new();
        let (p1, m1) = project("pr1", "u1");
        let (p2, m2) = project("pr2", "u1");
        store.create_default_project(p1, m1).await.unwrap();
        let err = store.create_default_project(p2, m2).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.projects_owned_by("u1").await.len(), 1);
        assert_eq!(store.members_of("pr1").await.len(), 1);
        assert!(store.members_of("pr2").await.is_empty());
    }

    #[tokio::test]
    async fn signing_keys_are_not_replaced() {
        let store = InMemoryStore::new();
        let key = |pem: &str| SigningKey {
            platform_id: "p1".into(),
            public_key: pem.into(),
            algorithm: jsonwebtoken::Algorithm::RS256,
            display_name: "k".into(),
        };
        store.add_signing_key(key("first")).await.unwrap();
        store.add_signing_key(key("second")).await.unwrap();
        assert_eq!(store.public_key("p1").await.unwrap().unwrap().public_key, "first");
        assert!(store.public_key("p2").await.unwrap().is_none());
    }
}
