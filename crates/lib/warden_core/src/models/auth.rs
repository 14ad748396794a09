//! Authentication domain models.
//!
//! These are internal domain models, distinct from the HTTP request/response
//! types in `warden_api` (which have `#[serde(rename)]` for camelCase etc.).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

/// Error returned when a stored enum value is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Declares the `as_str` / `FromStr` / `Display` trio for a storage enum.
macro_rules! storage_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// Storage representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Role of a user within its platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlatformRole {
    Admin,
    Member,
}

storage_enum!(PlatformRole, "platform role", { Admin => "ADMIN", Member => "MEMBER" });

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Inactive,
}

storage_enum!(UserStatus, "user status", { Active => "ACTIVE", Inactive => "INACTIVE" });

/// Authentication provider backing a [`UserIdentity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthProvider {
    Email,
    Github,
    Google,
}

storage_enum!(AuthProvider, "auth provider", {
    Email => "EMAIL",
    Github => "GITHUB",
    Google => "GOOGLE",
});

/// OAuth providers accepted by social sign-in. `EMAIL` is deliberately absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SocialProvider {
    Github,
    Google,
}

impl From<SocialProvider> for AuthProvider {
    fn from(provider: SocialProvider) -> Self {
        match provider {
            SocialProvider::Github => AuthProvider::Github,
            SocialProvider::Google => AuthProvider::Google,
        }
    }
}

/// Role of a user within a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectRole {
    Admin,
    Editor,
    Operator,
    Viewer,
}

storage_enum!(ProjectRole, "project role", {
    Admin => "ADMIN",
    Editor => "EDITOR",
    Operator => "OPERATOR",
    Viewer => "VIEWER",
});

/// Tenant boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub id: String,
    pub name: String,
    /// Unset until the first user is attached.
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Public half of a platform's signing key pair.
///
/// The private half never lives here; it is loaded from process configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKey {
    pub platform_id: String,
    /// SPKI PEM.
    pub public_key: String,
    pub algorithm: Algorithm,
    pub display_name: String,
}

/// Domain user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub image: Option<String>,
    pub platform_id: Option<String>,
    pub platform_role: PlatformRole,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

/// One credential record per (user, provider). Carries the revocation counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: String,
    pub user_id: String,
    pub email: String,
    /// Present only for [`AuthProvider::Email`].
    pub password: Option<String>,
    pub provider: AuthProvider,
    pub token_version: i32,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

/// A user's workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub owner_id: String,
    pub platform_id: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// Membership of a user in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMember {
    pub id: String,
    pub project_id: String,
    pub user_id: String,
    pub platform_id: String,
    pub role: ProjectRole,
    pub created_at: DateTime<Utc>,
}

/// Distinguishes the two token kinds; otherwise their payloads are identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// JWT claims embedded in access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    /// Subject — user ID (standard JWT `sub` claim).
    pub sub: String,
    pub email: String,
    pub platform_id: String,
    pub project_id: String,
    /// Snapshot of the user's revocation counter at issue time.
    pub token_version: i32,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

/// Freshly minted access/refresh pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub access_expires_in: i64,
    /// Refresh token lifetime in seconds.
    pub refresh_expires_in: i64,
}

/// Verified profile handed over by the OAuth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialProfile {
    pub email: String,
    pub name: String,
    pub image: Option<String>,
    pub provider: SocialProvider,
}

/// Result of a successful sign-up or sign-in.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub user: User,
    pub project: Project,
    pub token_version: i32,
    pub tokens: TokenPair,
}

/// Resolved session for an authenticated request.
///
/// Identity fields come from the verified token; display fields are
/// hydrated from storage on every lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub image: Option<String>,
    pub platform_id: String,
    pub project_id: String,
    pub platform_role: PlatformRole,
    pub token_version: i32,
    /// Access token expiry (unix timestamp).
    pub expires_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_enums_round_trip_through_text() {
        assert_eq!("GITHUB".parse::<AuthProvider>(), Ok(AuthProvider::Github));
        assert_eq!(ProjectRole::Operator.as_str(), "OPERATOR");
        assert_eq!(PlatformRole::Member.to_string(), "MEMBER");
        let err = "ROOT".parse::<PlatformRole>().unwrap_err();
        assert_eq!(err.to_string(), "unknown platform role 'ROOT'");
    }

    #[test]
    fn claims_use_wire_names() {
        let claims = TokenClaims {
            sub: "u1".into(),
            email: "a@x.com".into(),
            platform_id: "p1".into(),
            project_id: "pr1".into(),
            token_version: 3,
            token_type: TokenType::Refresh,
            iat: 10,
            exp: 20,
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["platformId"], "p1");
        assert_eq!(json["projectId"], "pr1");
        assert_eq!(json["tokenVersion"], 3);
        assert_eq!(json["type"], "refresh");
    }

    #[test]
    fn social_provider_maps_onto_auth_provider() {
        assert_eq!(AuthProvider::from(SocialProvider::Google), AuthProvider::Google);
        assert_eq!(AuthProvider::from(SocialProvider::Github), AuthProvider::Github);
    }
}
