//! Identity resolution.
//!
//! Maps an email/password or social sign-in onto the user, platform and
//! project graph, creating records as needed, and hands back a token pair.
//! Tokens are only issued once the user's platform and default project both
//! exist, since their ids are embedded in the claims.
//!
//! Races between concurrent requests are settled by the store's uniqueness
//! rules: a `Conflict` on insert means another request got there first, and
//! the flow re-reads instead of failing (or reports a duplicate email for
//! sign-up).

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::auth::AuthError;
use crate::auth::jwt::TokenService;
use crate::auth::password::{check_password, hash_password};
use crate::config::AuthConfig;
use crate::models::auth::{
    AuthOutcome, AuthProvider, Platform, PlatformRole, Project, ProjectMember, ProjectRole,
    SocialProfile, SocialProvider, User, UserIdentity, UserStatus,
};
use crate::store::{CredentialStore, KeyStore, StoreError};
use crate::uuid::new_id;

/// Display name of every auto-created default project.
pub const DEFAULT_PROJECT_NAME: &str = "Default Project";

/// How a newly created identity authenticates.
enum Credential {
    /// bcrypt hash of the user's password.
    Password(String),
    /// Profile already verified by the OAuth layer.
    Social(SocialProvider),
}

impl Credential {
    fn into_identity(self, user: &User, token_version: i32, now: DateTime<Utc>) -> UserIdentity {
        let (provider, password, verified) = match self {
            Credential::Password(hash) => (AuthProvider::Email, Some(hash), false),
            Credential::Social(provider) => (provider.into(), None, true),
        };
        UserIdentity {
            id: new_id(),
            user_id: user.id.clone(),
            email: user.email.clone(),
            password,
            provider,
            token_version,
            verified,
            created_at: now,
        }
    }
}

/// Sign-up, sign-in and social sign-in over the credential and key stores.
pub struct IdentityService {
    store: Arc<dyn CredentialStore>,
    keys: Arc<dyn KeyStore>,
    tokens: Arc<TokenService>,
    default_platform_name: String,
}

impl IdentityService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        keys: Arc<dyn KeyStore>,
        tokens: Arc<TokenService>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            store,
            keys,
            tokens,
            default_platform_name: config.default_platform_name.clone(),
        }
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    /// Return the system's default platform, creating it on first use.
    ///
    /// Also registers the configured public key for the platform if it has
    /// none, so tokens signed for it can be verified. A registered key that
    /// does not match the configured private key is a [`AuthError::Config`]
    /// error.
    pub async fn ensure_default_platform(&self) -> Result<Platform, AuthError> {
        let platform = match self.store.first_platform().await? {
            Some(platform) => platform,
            None => {
                let candidate = Platform {
                    id: new_id(),
                    name: self.default_platform_name.clone(),
                    owner_id: None,
                    created_at: Utc::now(),
                };
                let candidate_id = candidate.id.clone();
                let platform = self.store.create_default_platform(candidate).await?;
                if platform.id == candidate_id {
                    info!(platform_id = %platform.id, name = %platform.name, "created default platform");
                }
                platform
            }
        };

        let signer = self.tokens.signer();
        match self.keys.public_key(&platform.id).await? {
            Some(key) if key.public_key.trim() != signer.public_key_pem().trim() => {
                return Err(AuthError::Config(format!(
                    "platform {} signing key does not match configured private key",
                    platform.id
                )));
            }
            Some(_) => {}
            None => {
                let key = signer.signing_key_for(&platform.id, &platform.name);
                self.keys.add_signing_key(key).await?;
                info!(platform_id = %platform.id, "registered platform signing key");
            }
        }
        Ok(platform)
    }

    /// The user's default project on `platform_id`, created (with an ADMIN
    /// membership for the owner) if it does not exist yet.
    ///
    /// Concurrent callers all get the same project.
    pub async fn get_or_create_default_project(
        &self,
        user_id: &str,
        platform_id: &str,
    ) -> Result<Project, AuthError> {
        if let Some(project) = self.store.find_default_project(user_id, platform_id).await? {
            return Ok(project);
        }

        let now = Utc::now();
        let project = Project {
            id: new_id(),
            owner_id: user_id.to_string(),
            platform_id: platform_id.to_string(),
            display_name: DEFAULT_PROJECT_NAME.to_string(),
            created_at: now,
        };
        let member = ProjectMember {
            id: new_id(),
            project_id: project.id.clone(),
            user_id: user_id.to_string(),
            platform_id: platform_id.to_string(),
            role: ProjectRole::Admin,
            created_at: now,
        };

        match self.store.create_default_project(project, member).await {
            Ok(project) => {
                info!(user_id, platform_id, project_id = %project.id, "created default project");
                Ok(project)
            }
            Err(StoreError::Conflict(_)) => {
                debug!(user_id, platform_id, "default project created concurrently");
                self.store
                    .find_default_project(user_id, platform_id)
                    .await?
                    .ok_or_else(|| {
                        AuthError::Internal(format!(
                            "default project for {user_id} on {platform_id} missing after conflict"
                        ))
                    })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Register a new email/password account.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<AuthOutcome, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::ValidationError("A valid email is required".into()));
        }
        if password.is_empty() {
            return Err(AuthError::ValidationError("Password is required".into()));
        }
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::DuplicateEmail);
        }

        let platform = self.ensure_default_platform().await?;
        let now = Utc::now();
        let user = new_user(&email, name, None, &platform.id, now);
        let identity = Credential::Password(hash_password(password)?).into_identity(&user, 0, now);

        let (user, identity) = match self.store.create_user_with_identity(user, identity).await {
            Ok(created) => created,
            Err(StoreError::Conflict(_)) => return Err(AuthError::DuplicateEmail),
            Err(e) => return Err(e.into()),
        };
        self.store
            .set_platform_owner_if_unset(&platform.id, &user.id)
            .await?;
        info!(user_id = %user.id, platform_id = %platform.id, "registered user");

        self.complete(user, identity.token_version).await
    }

    /// Authenticate with email and password.
    ///
    /// Every failure (unknown email, no password on file, wrong password,
    /// inactive account) is the same [`AuthError::CredentialError`].
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthOutcome, AuthError> {
        let email = normalize_email(email);
        let Some(user) = self.store.find_user_by_email(&email).await? else {
            equalize_timing(password);
            return Err(AuthError::CredentialError);
        };
        let identity = self
            .store
            .find_identity(&user.id, AuthProvider::Email)
            .await?;
        let Some((identity, stored)) =
            identity.and_then(|i| i.password.clone().map(|hash| (i, hash)))
        else {
            equalize_timing(password);
            return Err(AuthError::CredentialError);
        };

        let check = check_password(password, &stored);
        if !check.is_match() {
            debug!(user_id = %user.id, "sign-in rejected: password mismatch");
            return Err(AuthError::CredentialError);
        }
        if user.status == UserStatus::Inactive {
            debug!(user_id = %user.id, "sign-in rejected: inactive user");
            return Err(AuthError::CredentialError);
        }
        if check.needs_rehash() {
            self.migrate_password(&identity, password).await;
        }

        let token_version = self.current_token_version(&user.id).await?;
        self.complete(user, token_version).await
    }

    /// Sign in with a profile already verified by an OAuth provider.
    ///
    /// Creates the user on first sight; otherwise links the provider to the
    /// existing account. Repeating the call never duplicates users or
    /// identities.
    pub async fn sign_in_social(&self, profile: SocialProfile) -> Result<AuthOutcome, AuthError> {
        let email = normalize_email(&profile.email);
        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::ValidationError(
                "Social profile has no usable email".into(),
            ));
        }

        let user = match self.store.find_user_by_email(&email).await? {
            Some(user) => {
                reject_inactive(&user)?;
                self.link_social(user, &profile).await?
            }
            None => self.create_social_user(&email, &profile).await?,
        };

        let token_version = self.current_token_version(&user.id).await?;
        self.complete(user, token_version).await
    }

    /// Invalidate every token issued to the user. Returns the new tokenVersion.
    pub async fn revoke_sessions(&self, user_id: &str) -> Result<i32, AuthError> {
        let version = self.store.increment_token_version(user_id).await?;
        info!(user_id, token_version = version, "revoked all sessions");
        Ok(version)
    }

    async fn create_social_user(
        &self,
        email: &str,
        profile: &SocialProfile,
    ) -> Result<User, AuthError> {
        let platform = self.ensure_default_platform().await?;
        let now = Utc::now();
        let user = new_user(email, &profile.name, non_empty(&profile.image), &platform.id, now);
        let identity = Credential::Social(profile.provider).into_identity(&user, 0, now);

        match self.store.create_user_with_identity(user, identity).await {
            Ok((user, _)) => {
                self.store
                    .set_platform_owner_if_unset(&platform.id, &user.id)
                    .await?;
                info!(
                    user_id = %user.id,
                    provider = %AuthProvider::from(profile.provider),
                    "registered user via social sign-in"
                );
                Ok(user)
            }
            Err(StoreError::Conflict(_)) => {
                let user = self.store.find_user_by_email(email).await?.ok_or_else(|| {
                    AuthError::Internal(format!("user {email} missing after conflict"))
                })?;
                reject_inactive(&user)?;
                self.link_social(user, profile).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn link_social(&self, mut user: User, profile: &SocialProfile) -> Result<User, AuthError> {
        if user.image.is_none()
            && let Some(image) = non_empty(&profile.image)
        {
            self.store.set_user_image(&user.id, &image).await?;
            user.image = Some(image);
        }

        let provider = AuthProvider::from(profile.provider);
        if self.store.find_identity(&user.id, provider).await?.is_none() {
            // Linked identities join at the account's current revocation state.
            let token_version = self.current_token_version(&user.id).await?;
            let identity = Credential::Social(profile.provider).into_identity(
                &user,
                token_version,
                Utc::now(),
            );
            match self.store.create_identity(identity).await {
                Ok(_) => info!(user_id = %user.id, %provider, "linked social identity"),
                Err(StoreError::Conflict(_)) => {
                    debug!(user_id = %user.id, %provider, "identity linked concurrently")
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(user)
    }

    /// Attach a platform if needed, ensure the default project, issue tokens.
    async fn complete(&self, mut user: User, token_version: i32) -> Result<AuthOutcome, AuthError> {
        let platform_id = match user.platform_id.clone() {
            Some(platform_id) => platform_id,
            None => {
                let platform = self.ensure_default_platform().await?;
                self.store.set_user_platform(&user.id, &platform.id).await?;
                self.store
                    .set_platform_owner_if_unset(&platform.id, &user.id)
                    .await?;
                info!(user_id = %user.id, platform_id = %platform.id, "attached user to platform");
                user.platform_id = Some(platform.id.clone());
                platform.id
            }
        };

        let project = self
            .get_or_create_default_project(&user.id, &platform_id)
            .await?;
        let tokens = self.tokens.issue(
            &user.id,
            &user.email,
            &platform_id,
            &project.id,
            token_version,
        )?;
        Ok(AuthOutcome {
            user,
            project,
            token_version,
            tokens,
        })
    }

    async fn current_token_version(&self, user_id: &str) -> Result<i32, AuthError> {
        Ok(self.store.token_version(user_id).await?.unwrap_or(0))
    }

    /// Replace a legacy hash with bcrypt. Failure is logged, never fatal.
    async fn migrate_password(&self, identity: &UserIdentity, password: &str) {
        let hash = match hash_password(password) {
            Ok(hash) => hash,
            Err(e) => {
                warn!(user_id = %identity.user_id, error = %e, "legacy password rehash failed");
                return;
            }
        };
        match self.store.set_identity_password(&identity.id, &hash).await {
            Ok(()) => info!(user_id = %identity.user_id, "migrated legacy password hash"),
            Err(e) => {
                warn!(user_id = %identity.user_id, error = %e, "storing migrated password failed")
            }
        }
    }
}

fn new_user(
    email: &str,
    name: &str,
    image: Option<String>,
    platform_id: &str,
    now: DateTime<Utc>,
) -> User {
    let name = match name.trim() {
        "" => email.split('@').next().unwrap_or(email).to_string(),
        name => name.to_string(),
    };
    User {
        id: new_id(),
        name,
        email: email.to_string(),
        email_verified: true,
        image,
        platform_id: Some(platform_id.to_string()),
        platform_role: PlatformRole::Member,
        status: UserStatus::Active,
        created_at: now,
    }
}

/// Inactive accounts may not sign in socially. Checked before any linking
/// so a rejected attempt writes nothing.
fn reject_inactive(user: &User) -> Result<(), AuthError> {
    if user.status == UserStatus::Inactive {
        debug!(user_id = %user.id, "social sign-in rejected: inactive user");
        return Err(AuthError::CredentialError);
    }
    Ok(())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Spend a bcrypt verification so unknown accounts take as long as wrong passwords.
fn equalize_timing(password: &str) {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();
    if let Some(hash) = DUMMY_HASH.get_or_init(|| hash_password("warden-timing-guard").ok()) {
        let _ = check_password(password, hash);
    }
}
