//! Authentication middleware — resolves the caller's session from a bearer
//! token or the access cookie.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use warden_core::models::auth::Session;

use crate::AppState;
use crate::error::AppError;

/// Key used to store the resolved `Session` in request extensions.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

/// Axum middleware: resolves the session via the session facade and injects
/// `CurrentSession` into request extensions. Missing, invalid, expired and
/// revoked tokens all yield 401.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let session = state
        .auth
        .sessions
        .get_session(request.headers())
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".into()))?;

    request.extensions_mut().insert(CurrentSession(session));

    Ok(next.run(request).await)
}
