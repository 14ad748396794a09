//! PostgreSQL implementation of the credential and key stores.
//!
//! Queries are runtime-checked (`sqlx::query_as`) against the schema in
//! `migrations/`. Multi-row writes run in a transaction. Unique-constraint
//! violations surface as [`StoreError::Conflict`] so callers can resolve
//! races by re-reading.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::Algorithm;
use sqlx::PgPool;

use super::{CredentialStore, KeyStore, StoreError, StoreResult};
use crate::models::auth::{
    AuthProvider, Platform, Project, ProjectMember, SigningKey, User, UserIdentity,
};

/// Advisory lock key serialising default-platform creation.
const DEFAULT_PLATFORM_LOCK: i64 = 0x7761_7264_656e_0001;

const USER_COLUMNS: &str = "id, name, email, email_verified, image, platform_id, \
                            platform_role, status, created_at";
const IDENTITY_COLUMNS: &str =
    "id, user_id, email, password, provider, token_version, verified, created_at";
const PROJECT_COLUMNS: &str = "id, owner_id, platform_id, display_name, created_at";

/// Store backed by a `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DbUser {
    id: String,
    name: String,
    email: String,
    email_verified: bool,
    image: Option<String>,
    platform_id: Option<String>,
    platform_role: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<DbUser> for User {
    type Error = StoreError;

    fn try_from(row: DbUser) -> StoreResult<Self> {
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            email_verified: row.email_verified,
            image: row.image,
            platform_id: row.platform_id,
            platform_role: row.platform_role.parse().map_err(corrupt)?,
            status: row.status.parse().map_err(corrupt)?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DbIdentity {
    id: String,
    user_id: String,
    email: String,
    password: Option<String>,
    provider: String,
    token_version: i32,
    verified: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<DbIdentity> for UserIdentity {
    type Error = StoreError;

    fn try_from(row: DbIdentity) -> StoreResult<Self> {
        Ok(UserIdentity {
            id: row.id,
            user_id: row.user_id,
            email: row.email,
            password: row.password,
            provider: row.provider.parse().map_err(corrupt)?,
            token_version: row.token_version,
            verified: row.verified,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DbPlatform {
    id: String,
    name: String,
    owner_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<DbPlatform> for Platform {
    fn from(row: DbPlatform) -> Self {
        Platform {
            id: row.id,
            name: row.name,
            owner_id: row.owner_id,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DbProject {
    id: String,
    owner_id: String,
    platform_id: String,
    display_name: String,
    created_at: DateTime<Utc>,
}

impl From<DbProject> for Project {
    fn from(row: DbProject) -> Self {
        Project {
            id: row.id,
            owner_id: row.owner_id,
            platform_id: row.platform_id,
            display_name: row.display_name,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DbSigningKey {
    platform_id: String,
    public_key: String,
    algorithm: String,
    display_name: String,
}

impl TryFrom<DbSigningKey> for SigningKey {
    type Error = StoreError;

    fn try_from(row: DbSigningKey) -> StoreResult<Self> {
        let algorithm = row
            .algorithm
            .parse::<Algorithm>()
            .map_err(|_| StoreError::Corrupt(format!("unknown algorithm '{}'", row.algorithm)))?;
        Ok(SigningKey {
            platform_id: row.platform_id,
            public_key: row.public_key,
            algorithm,
            display_name: row.display_name,
        })
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, DbUser>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_by_id(&self, user_id: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, DbUser>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn create_user_with_identity(
        &self,
        user: User,
        identity: UserIdentity,
    ) -> StoreResult<(User, UserIdentity)> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO users (id, name, email, email_verified, image, platform_id, \
             platform_role, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.email_verified)
        .bind(&user.image)
        .bind(&user.platform_id)
        .bind(user.platform_role.as_str())
        .bind(user.status.as_str())
        .bind(user.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_or_db(e, "email already registered"))?;

        insert_identity(&mut tx, &identity).await?;

        tx.commit().await?;
        Ok((user, identity))
    }

    async fn set_user_image(&self, user_id: &str, image: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET image = $2 WHERE id = $1")
            .bind(user_id)
            .bind(image)
            .execute(&self.pool)
            .await?;
        expect_row(result.rows_affected(), || format!("user {user_id}"))
    }

    async fn set_user_platform(&self, user_id: &str, platform_id: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET platform_id = $2 WHERE id = $1")
            .bind(user_id)
            .bind(platform_id)
            .execute(&self.pool)
            .await?;
        expect_row(result.rows_affected(), || format!("user {user_id}"))
    }

    async fn find_identity(
        &self,
        user_id: &str,
        provider: AuthProvider,
    ) -> StoreResult<Option<UserIdentity>> {
        let sql = format!(
            "SELECT {IDENTITY_COLUMNS} FROM user_identities WHERE user_id = $1 AND provider = $2"
        );
        sqlx::query_as::<_, DbIdentity>(&sql)
            .bind(user_id)
            .bind(provider.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(UserIdentity::try_from)
            .transpose()
    }

    async fn create_identity(&self, identity: UserIdentity) -> StoreResult<UserIdentity> {
        let mut tx = self.pool.begin().await?;
        insert_identity(&mut tx, &identity).await?;
        tx.commit().await?;
        Ok(identity)
    }

    async fn set_identity_password(&self, identity_id: &str, password: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE user_identities SET password = $2 WHERE id = $1")
            .bind(identity_id)
            .bind(password)
            .execute(&self.pool)
            .await?;
        expect_row(result.rows_affected(), || format!("identity {identity_id}"))
    }

    async fn token_version(&self, user_id: &str) -> StoreResult<Option<i32>> {
        let version = sqlx::query_scalar::<_, i32>(
            "SELECT token_version FROM user_identities WHERE user_id = $1 \
             ORDER BY created_at, id LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(version)
    }

    async fn increment_token_version(&self, user_id: &str) -> StoreResult<i32> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE user_identities SET token_version = token_version + 1 WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        expect_row(result.rows_affected(), || {
            format!("identities for user {user_id}")
        })?;
        let version = sqlx::query_scalar::<_, i32>(
            "SELECT token_version FROM user_identities WHERE user_id = $1 \
             ORDER BY created_at, id LIMIT 1",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(version)
    }

    async fn first_platform(&self) -> StoreResult<Option<Platform>> {
        let row = sqlx::query_as::<_, DbPlatform>(
            "SELECT id, name, owner_id, created_at FROM platforms \
             ORDER BY created_at, id LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Platform::from))
    }

    async fn find_platform(&self, platform_id: &str) -> StoreResult<Option<Platform>> {
        let row = sqlx::query_as::<_, DbPlatform>(
            "SELECT id, name, owner_id, created_at FROM platforms WHERE id = $1",
        )
        .bind(platform_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Platform::from))
    }

    async fn create_default_platform(&self, platform: Platform) -> StoreResult<Platform> {
        let mut tx = self.pool.begin().await?;
        // Serialise concurrent first-time callers; released at commit.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(DEFAULT_PLATFORM_LOCK)
            .execute(&mut *tx)
            .await?;

        let existing = sqlx::query_as::<_, DbPlatform>(
            "SELECT id, name, owner_id, created_at FROM platforms \
             ORDER BY created_at, id LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(existing) = existing {
            tx.commit().await?;
            return Ok(existing.into());
        }

        sqlx::query("INSERT INTO platforms (id, name, owner_id, created_at) VALUES ($1, $2, $3, $4)")
            .bind(&platform.id)
            .bind(&platform.name)
            .bind(&platform.owner_id)
            .bind(platform.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| conflict_or_db(e, "platform exists"))?;
        tx.commit().await?;
        Ok(platform)
    }

    async fn set_platform_owner_if_unset(
        &self,
        platform_id: &str,
        user_id: &str,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE platforms SET owner_id = $2 WHERE id = $1 AND owner_id IS NULL")
            .bind(platform_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_default_project(
        &self,
        owner_id: &str,
        platform_id: &str,
    ) -> StoreResult<Option<Project>> {
        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM projects \
             WHERE owner_id = $1 AND platform_id = $2 AND is_default"
        );
        let row = sqlx::query_as::<_, DbProject>(&sql)
            .bind(owner_id)
            .bind(platform_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Project::from))
    }

    async fn create_default_project(
        &self,
        project: Project,
        member: ProjectMember,
    ) -> StoreResult<Project> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO projects (id, owner_id, platform_id, display_name, is_default, created_at) \
             VALUES ($1, $2, $3, $4, TRUE, $5)",
        )
        .bind(&project.id)
        .bind(&project.owner_id)
        .bind(&project.platform_id)
        .bind(&project.display_name)
        .bind(project.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_or_db(e, "default project exists"))?;

        sqlx::query(
            "INSERT INTO project_members (id, project_id, user_id, platform_id, role, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&member.id)
        .bind(&member.project_id)
        .bind(&member.user_id)
        .bind(&member.platform_id)
        .bind(member.role.as_str())
        .bind(member.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_or_db(e, "project member exists"))?;

        tx.commit().await?;
        Ok(project)
    }
}

#[async_trait]
impl KeyStore for PgStore {
    async fn public_key(&self, platform_id: &str) -> StoreResult<Option<SigningKey>> {
        sqlx::query_as::<_, DbSigningKey>(
            "SELECT platform_id, public_key, algorithm, display_name \
             FROM signing_keys WHERE platform_id = $1",
        )
        .bind(platform_id)
        .fetch_optional(&self.pool)
        .await?
        .map(SigningKey::try_from)
        .transpose()
    }

    async fn add_signing_key(&self, key: SigningKey) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO signing_keys (platform_id, public_key, algorithm, display_name) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (platform_id) DO NOTHING",
        )
        .bind(&key.platform_id)
        .bind(&key.public_key)
        .bind(algorithm_name(key.algorithm))
        .bind(&key.display_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

async fn insert_identity(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    identity: &UserIdentity,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO user_identities (id, user_id, email, password, provider, token_version, \
         verified, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(&identity.id)
    .bind(&identity.user_id)
    .bind(&identity.email)
    .bind(&identity.password)
    .bind(identity.provider.as_str())
    .bind(identity.token_version)
    .bind(identity.verified)
    .bind(identity.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| conflict_or_db(e, "identity exists for provider"))?;
    Ok(())
}

fn expect_row(rows_affected: u64, what: impl FnOnce() -> String) -> StoreResult<()> {
    if rows_affected == 0 {
        return Err(StoreError::NotFound(what()));
    }
    Ok(())
}

fn conflict_or_db(err: sqlx::Error, conflict: &str) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::Conflict(conflict.to_string())
    } else {
        StoreError::Db(err)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23505").unwrap_or(false);
    }
    false
}

fn corrupt(err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

fn algorithm_name(alg: Algorithm) -> &'static str {
    match alg {
        Algorithm::HS256 => "HS256",
        Algorithm::HS384 => "HS384",
        Algorithm::HS512 => "HS512",
        Algorithm::ES256 => "ES256",
        Algorithm::ES384 => "ES384",
        Algorithm::RS256 => "RS256",
        Algorithm::RS384 => "RS384",
        Algorithm::RS512 => "RS512",
        Algorithm::PS256 => "PS256",
        Algorithm::PS384 => "PS384",
        Algorithm::PS512 => "PS512",
        Algorithm::EdDSA => "EdDSA",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_names_parse_back() {
        for alg in [Algorithm::RS256, Algorithm::ES256, Algorithm::EdDSA, Algorithm::PS512] {
            assert_eq!(algorithm_name(alg).parse::<Algorithm>().unwrap(), alg);
        }
    }

    #[test]
    fn non_database_errors_are_not_conflicts() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
        assert!(matches!(
            conflict_or_db(sqlx::Error::RowNotFound, "x"),
            StoreError::Db(_)
        ));
    }

    #[test]
    fn zero_rows_is_not_found() {
        assert!(expect_row(1, || "x".into()).is_ok());
        assert!(matches!(
            expect_row(0, || "user u1".into()),
            Err(StoreError::NotFound(msg)) if msg == "user u1"
        ));
    }
}
