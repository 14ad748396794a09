//! Authentication request handlers.

use axum::body::Bytes;
use axum::extract::{Extension, State};
use axum::http::HeaderMap;
use axum::Json;
use axum_extra::extract::CookieJar;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::CurrentSession;
use crate::models::{
    AuthResponse, RefreshRequest, RevokeResponse, SessionResponse, SignInRequest,
    SignOutResponse, SignUpRequest, TokenResponse,
};
use crate::services::cookies::{REFRESH_COOKIE, with_token_cookies, without_token_cookies};

/// `POST /auth/sign-up` — create an account and start a session.
pub async fn sign_up_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<SignUpRequest>,
) -> AppResult<(CookieJar, Json<AuthResponse>)> {
    let outcome = state
        .auth
        .identity
        .sign_up(&body.email, &body.password, body.name.as_deref().unwrap_or(""))
        .await?;
    let jar = with_token_cookies(jar, &outcome.tokens, state.config.secure_cookies);
    Ok((jar, Json(outcome.into())))
}

/// `POST /auth/sign-in` — authenticate with email + password.
pub async fn sign_in_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<SignInRequest>,
) -> AppResult<(CookieJar, Json<AuthResponse>)> {
    let outcome = state
        .auth
        .identity
        .sign_in(&body.email, &body.password)
        .await?;
    let jar = with_token_cookies(jar, &outcome.tokens, state.config.secure_cookies);
    Ok((jar, Json(outcome.into())))
}

/// `POST /auth/refresh` — exchange a refresh token for a new token pair.
///
/// The token comes from the JSON body if present, else from the refresh cookie.
pub async fn refresh_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let request: RefreshRequest = if body.is_empty() {
        RefreshRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("Invalid request body: {e}")))?
    };
    let token = request
        .refresh_token
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing refresh token".into()))?;

    let pair = state
        .auth
        .tokens
        .refresh(&token)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".into()))?;
    let jar = with_token_cookies(jar, &pair, state.config.secure_cookies);
    Ok((jar, Json(pair.into())))
}

/// `POST /auth/sign-out` — clear auth cookies. Issued tokens stay valid
/// until they expire; use `/auth/revoke` to invalidate them.
pub async fn sign_out_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<SignOutResponse>) {
    (
        without_token_cookies(jar, state.config.secure_cookies),
        Json(SignOutResponse { success: true }),
    )
}

/// `GET /auth/session` — the caller's session, or 401.
pub async fn session_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<SessionResponse>> {
    let session = state
        .auth
        .sessions
        .get_session(&headers)
        .await?
        .ok_or_else(|| AppError::Unauthorized("No active session".into()))?;
    Ok(Json(SessionResponse { session }))
}

/// `POST /auth/revoke` — invalidate every token issued to the caller.
/// Requires authentication.
pub async fn revoke_handler(
    State(state): State<AppState>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<RevokeResponse>)> {
    let token_version = state
        .auth
        .identity
        .revoke_sessions(&session.user_id)
        .await?;
    Ok((
        without_token_cookies(jar, state.config.secure_cookies),
        Json(RevokeResponse { token_version }),
    ))
}
