//! API server configuration.

use warden_core::config::AuthConfig;

/// Configuration for the API server.
///
/// The server binary fills this from its CLI flags; tests use
/// [`ApiConfig::new`].
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// Token signing and lifetime settings.
    pub auth: AuthConfig,
    /// Mark auth cookies `Secure` (HTTPS only).
    pub secure_cookies: bool,
}

impl ApiConfig {
    /// Config with local defaults around the given auth settings.
    pub fn new(auth: AuthConfig) -> Self {
        Self {
            bind_addr: "127.0.0.1:3100".into(),
            auth,
            secure_cookies: false,
        }
    }
}
