//! Warden API server binary.
//!
//! Connects to PostgreSQL, runs migrations and serves the auth routes.
//! Signing key and token lifetimes come from the environment (see
//! `warden_core::config::AuthConfig::from_env`).

use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use warden_api::config::ApiConfig;
use warden_core::config::AuthConfig;
use warden_core::store::postgres::PgStore;

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "warden_api_server", about = "Warden authentication API server")]
struct Args {
    /// Interface to bind.
    #[arg(long, env = "BIND_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on (0 = ephemeral).
    #[arg(long, env = "PORT", default_value_t = 3100)]
    port: u16,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/warden"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Mark auth cookies `Secure`. Enable when served over HTTPS.
    #[arg(long, env = "SECURE_COOKIES", default_value_t = false)]
    secure_cookies: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,warden_api=debug,warden_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    info!(port = args.port, "starting warden_api_server");

    // Fail before touching the database if the signing key is missing.
    let auth = AuthConfig::from_env()?;
    info!(
        access = %auth.lifetimes.access,
        refresh = %auth.lifetimes.refresh,
        "loaded auth configuration"
    );

    info!(max_connections = args.max_connections, "configuring connection pool");
    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&args.database_url)
        .await?;

    info!("running database migrations");
    warden_api::migrate(&pool).await?;

    let config = ApiConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        auth,
        secure_cookies: args.secure_cookies,
    };

    let state = warden_api::AppState::new(Arc::new(PgStore::new(pool)), config.clone())?;
    let app = warden_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
