//! Cookie service — set/clear httpOnly auth cookies.
//!
//! Cookie names: `warden_access` (read by the session facade) and
//! `warden_refresh`.

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;
use warden_core::models::auth::TokenPair;

/// Cookie name for the access token.
pub use warden_core::session::ACCESS_COOKIE;
/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "warden_refresh";

fn auth_cookie(name: &'static str, value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}

/// Build a httpOnly cookie for the access token.
pub fn access_cookie(token: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    auth_cookie(
        ACCESS_COOKIE,
        token.to_string(),
        Duration::seconds(max_age_secs),
        secure,
    )
}

/// Build a httpOnly cookie for the refresh token.
pub fn refresh_cookie(token: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    auth_cookie(
        REFRESH_COOKIE,
        token.to_string(),
        Duration::seconds(max_age_secs),
        secure,
    )
}

/// Add both token cookies for a freshly issued pair.
pub fn with_token_cookies(jar: CookieJar, tokens: &TokenPair, secure: bool) -> CookieJar {
    jar.add(access_cookie(
        &tokens.access_token,
        tokens.access_expires_in,
        secure,
    ))
    .add(refresh_cookie(
        &tokens.refresh_token,
        tokens.refresh_expires_in,
        secure,
    ))
}

/// Replace both token cookies with expired ones.
pub fn without_token_cookies(jar: CookieJar, secure: bool) -> CookieJar {
    jar.add(auth_cookie(ACCESS_COOKIE, String::new(), Duration::ZERO, secure))
        .add(auth_cookie(REFRESH_COOKIE, String::new(), Duration::ZERO, secure))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_cookie_is_http_only() {
        let cookie = access_cookie("tok", 900, true);
        assert_eq!(cookie.name(), "warden_access");
        assert_eq!(cookie.value(), "tok");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(900)));
    }

    #[test]
    fn cleared_cookies_expire_immediately() {
        let jar = without_token_cookies(CookieJar::new(), false);
        let access = jar.get(ACCESS_COOKIE).unwrap();
        assert_eq!(access.value(), "");
        assert_eq!(access.max_age(), Some(Duration::ZERO));
        assert!(jar.get(REFRESH_COOKIE).is_some());
    }
}
