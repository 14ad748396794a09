//! Authentication configuration.

use std::collections::HashMap;
use std::fmt;

use chrono::Duration;

use crate::auth::AuthError;

/// Default access token lifetime.
pub const DEFAULT_ACCESS_EXPIRY: &str = "15m";
/// Default refresh token lifetime.
pub const DEFAULT_REFRESH_EXPIRY: &str = "7d";
/// Display name of the lazily created default platform.
pub const DEFAULT_PLATFORM_NAME: &str = "Default Platform";

/// Access and refresh token lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl TokenLifetimes {
    /// Lifetimes from two duration strings, e.g. `("15m", "7d")`.
    pub fn parse(access: &str, refresh: &str) -> Result<Self, AuthError> {
        Ok(Self {
            access: parse_duration(access)?,
            refresh: parse_duration(refresh)?,
        })
    }
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::minutes(15),
            refresh: Duration::days(7),
        }
    }
}

/// Authentication settings shared by the token and identity services.
#[derive(Clone)]
pub struct AuthConfig {
    /// RSA private key (PKCS8 PEM) used to sign every platform's tokens.
    pub private_key_pem: String,
    pub lifetimes: TokenLifetimes,
    /// Per-platform overrides of `lifetimes`, keyed by platform id.
    pub platform_lifetimes: HashMap<String, TokenLifetimes>,
    pub default_platform_name: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("private_key_pem", &"<redacted>")
            .field("lifetimes", &self.lifetimes)
            .field("platform_lifetimes", &self.platform_lifetimes)
            .field("default_platform_name", &self.default_platform_name)
            .finish()
    }
}

impl AuthConfig {
    /// Config with default lifetimes and platform name.
    pub fn new(private_key_pem: impl Into<String>) -> Self {
        Self {
            private_key_pem: private_key_pem.into(),
            lifetimes: TokenLifetimes::default(),
            platform_lifetimes: HashMap::new(),
            default_platform_name: DEFAULT_PLATFORM_NAME.to_string(),
        }
    }

    /// Reads configuration from environment variables.
    ///
    /// | Variable                | Default                      |
    /// |-------------------------|------------------------------|
    /// | `JWT_PRIVATE_KEY`       | — (or `JWT_PRIVATE_KEY_FILE`) |
    /// | `JWT_PRIVATE_KEY_FILE`  | —                            |
    /// | `ACCESS_TOKEN_EXPIRY`   | `15m`                        |
    /// | `REFRESH_TOKEN_EXPIRY`  | `7d`                         |
    /// | `DEFAULT_PLATFORM_NAME` | `Default Platform`           |
    /// | `PLATFORM_TOKEN_EXPIRY` | none                         |
    ///
    /// `PLATFORM_TOKEN_EXPIRY` lists per-platform overrides as
    /// `<platform id>=<access>/<refresh>`, comma separated.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`AuthConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AuthError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let private_key_pem = match non_empty("JWT_PRIVATE_KEY") {
            // Single-line env values carry escaped newlines.
            Some(pem) => pem.replace("\\n", "\n"),
            None => {
                let path = non_empty("JWT_PRIVATE_KEY_FILE").ok_or_else(|| {
                    AuthError::Config(
                        "JWT_PRIVATE_KEY or JWT_PRIVATE_KEY_FILE must be set".into(),
                    )
                })?;
                std::fs::read_to_string(&path)
                    .map_err(|e| AuthError::Config(format!("read {path}: {e}")))?
            }
        };

        let lifetimes = TokenLifetimes::parse(
            &non_empty("ACCESS_TOKEN_EXPIRY").unwrap_or_else(|| DEFAULT_ACCESS_EXPIRY.into()),
            &non_empty("REFRESH_TOKEN_EXPIRY").unwrap_or_else(|| DEFAULT_REFRESH_EXPIRY.into()),
        )?;
        let platform_lifetimes = match non_empty("PLATFORM_TOKEN_EXPIRY") {
            Some(spec) => parse_platform_lifetimes(&spec)?,
            None => HashMap::new(),
        };

        Ok(Self {
            private_key_pem,
            lifetimes,
            platform_lifetimes,
            default_platform_name: non_empty("DEFAULT_PLATFORM_NAME")
                .unwrap_or_else(|| DEFAULT_PLATFORM_NAME.into()),
        })
    }

    /// Override token lifetimes for one platform.
    pub fn with_platform_lifetimes(
        mut self,
        platform_id: impl Into<String>,
        access: &str,
        refresh: &str,
    ) -> Result<Self, AuthError> {
        self.platform_lifetimes
            .insert(platform_id.into(), TokenLifetimes::parse(access, refresh)?);
        Ok(self)
    }

    /// Lifetimes for tokens signed on behalf of `platform_id`.
    pub fn lifetimes_for(&self, platform_id: &str) -> TokenLifetimes {
        self.platform_lifetimes
            .get(platform_id)
            .copied()
            .unwrap_or(self.lifetimes)
    }
}

/// Parse `p1=5m/1d,p2=1h/30d` into per-platform lifetimes.
pub fn parse_platform_lifetimes(
    input: &str,
) -> Result<HashMap<String, TokenLifetimes>, AuthError> {
    let mut overrides = HashMap::new();
    for entry in input.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let invalid =
            || AuthError::Config(format!("invalid platform expiry '{entry}'"));
        let (platform_id, durations) = entry.split_once('=').ok_or_else(invalid)?;
        let (access, refresh) = durations.split_once('/').ok_or_else(invalid)?;
        let platform_id = platform_id.trim();
        if platform_id.is_empty() {
            return Err(invalid());
        }
        overrides.insert(
            platform_id.to_string(),
            TokenLifetimes::parse(access, refresh)?,
        );
    }
    Ok(overrides)
}

/// Parse a duration string such as `30s`, `15m`, `12h`, `7d` or `2w`.
pub fn parse_duration(input: &str) -> Result<Duration, AuthError> {
    let input = input.trim();
    let invalid = || AuthError::Config(format!("invalid duration '{input}'"));

    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (amount, unit) = input.split_at(split);
    let amount: i64 = amount.parse().map_err(|_| invalid())?;
    if amount <= 0 {
        return Err(invalid());
    }
    let duration = match unit {
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        "w" => Duration::try_weeks(amount),
        _ => None,
    };
    duration.ok_or_else(invalid)
}
