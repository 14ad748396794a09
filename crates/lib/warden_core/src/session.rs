//! Session lookup for incoming requests.
//!
//! The access token is taken from `Authorization: Bearer` first, then from
//! the access cookie. Any missing or invalid token resolves to `Ok(None)`;
//! only infrastructure failures are errors.

use std::collections::HashMap;
use std::sync::Arc;

use http::HeaderMap;
use http::header::{AUTHORIZATION, COOKIE};
use tracing::debug;

use crate::auth::AuthError;
use crate::auth::jwt::TokenService;
use crate::models::auth::Session;
use crate::store::CredentialStore;

/// Cookie carrying the access token.
pub const ACCESS_COOKIE: &str = "warden_access";

/// Read access to request cookies that have already been parsed.
pub trait CookieSource {
    fn cookie(&self, name: &str) -> Option<String>;
}

impl CookieSource for HashMap<String, String> {
    fn cookie(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Resolves requests to sessions.
pub struct SessionFacade {
    tokens: Arc<TokenService>,
    store: Arc<dyn CredentialStore>,
    cookie_name: String,
}

impl SessionFacade {
    pub fn new(tokens: Arc<TokenService>, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            tokens,
            store,
            cookie_name: ACCESS_COOKIE.to_string(),
        }
    }

    pub fn with_cookie_name(mut self, cookie_name: impl Into<String>) -> Self {
        self.cookie_name = cookie_name.into();
        self
    }

    /// Session for a request, from its bearer token or access cookie.
    pub async fn get_session(&self, headers: &HeaderMap) -> Result<Option<Session>, AuthError> {
        let token = bearer_token(headers).or_else(|| {
            headers
                .get_all(COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .find_map(|header| cookie_value(header, &self.cookie_name))
                .map(str::to_string)
        });
        match token {
            Some(token) => self.session_for_token(&token).await,
            None => Ok(None),
        }
    }

    /// Same as [`SessionFacade::get_session`], for callers that only have
    /// parsed cookies.
    pub async fn get_session_from_cookies(
        &self,
        cookies: &impl CookieSource,
    ) -> Result<Option<Session>, AuthError> {
        match cookies.cookie(&self.cookie_name).filter(|v| !v.is_empty()) {
            Some(token) => self.session_for_token(&token).await,
            None => Ok(None),
        }
    }

    /// Verify an access token and hydrate display fields from storage.
    pub async fn session_for_token(&self, token: &str) -> Result<Option<Session>, AuthError> {
        let Some(claims) = self.tokens.verify_access(token).await? else {
            return Ok(None);
        };
        let Some(user) = self.store.find_user_by_id(&claims.sub).await? else {
            debug!(user_id = %claims.sub, "no session: user missing");
            return Ok(None);
        };
        Ok(Some(Session {
            user_id: claims.sub,
            email: user.email,
            name: user.name,
            image: user.image,
            platform_id: claims.platform_id,
            project_id: claims.project_id,
            platform_role: user.platform_role,
            token_version: claims.token_version,
            expires_at: claims.exp,
        }))
    }
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

/// Value of cookie `name` in a raw `Cookie` header. The first exact key match wins.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}
