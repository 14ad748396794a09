//! # warden_api
//!
//! HTTP API library for Warden.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use warden_core::AuthServices;
use warden_core::auth::AuthError;
use warden_core::store::{CredentialStore, KeyStore};

use crate::config::ApiConfig;
use crate::handlers::auth;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Token, identity and session services.
    pub auth: AuthServices,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// Wire the auth services over `store`.
    pub fn new<S>(store: Arc<S>, config: ApiConfig) -> Result<Self, AuthError>
    where
        S: CredentialStore + KeyStore + 'static,
    {
        Ok(Self {
            auth: AuthServices::new(store, &config.auth)?,
            config,
        })
    }
}

/// Run embedded database migrations.
///
/// Delegates to `warden_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    warden_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::POST_AUTH_SIGN_UP, post(auth::sign_up_handler))
        .route(routes::POST_AUTH_SIGN_IN, post(auth::sign_in_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler))
        .route(routes::POST_AUTH_SIGN_OUT, post(auth::sign_out_handler))
        .route(routes::GET_AUTH_SESSION, get(auth::session_handler));

    // Protected routes (require a session)
    let protected = Router::new()
        .route(routes::POST_AUTH_REVOKE, post(auth::revoke_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_session,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
