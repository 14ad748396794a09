//! Schema migrations for the PostgreSQL credential and key stores.
//!
//! The SQL under `warden_core/migrations/` is embedded at compile time, so
//! the server binary carries its own schema.

use sqlx::PgPool;
use sqlx::migrate::{MigrateError, Migrator};
use tracing::info;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Apply any pending migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await?;
    info!(migrations = MIGRATOR.iter().count(), "auth schema up to date");
    Ok(())
}
