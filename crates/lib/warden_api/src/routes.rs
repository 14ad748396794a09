//! Route paths.

pub const POST_AUTH_SIGN_UP: &str = "/auth/sign-up";
pub const POST_AUTH_SIGN_IN: &str = "/auth/sign-in";
pub const POST_AUTH_REFRESH: &str = "/auth/refresh";
pub const POST_AUTH_SIGN_OUT: &str = "/auth/sign-out";
pub const GET_AUTH_SESSION: &str = "/auth/session";
pub const POST_AUTH_REVOKE: &str = "/auth/revoke";
