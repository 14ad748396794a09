//! JWT token generation and verification.
//!
//! Tokens are RS256-signed with the process-wide private key and verified
//! against the public key registered for the platform named in the token.
//! Because that key cannot be known up front, verification first peeks at
//! the unverified payload for `platformId` only, then fully verifies with the
//! resolved key. No other claim is trusted before the signature check.
//!
//! Revocation is a per-user counter (`tokenVersion`) re-read from storage on
//! every verification; there is no blacklist.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, Header, Validation, decode, encode};
use serde::Deserialize;
use tracing::{debug, info};

use super::AuthError;
use super::keys::{PlatformSigner, SIGNING_ALGORITHM};
use crate::config::{AuthConfig, TokenLifetimes};
use crate::models::auth::{TokenClaims, TokenPair, TokenType};
use crate::store::{CredentialStore, KeyStore};

/// Issues and verifies access/refresh token pairs.
pub struct TokenService {
    signer: PlatformSigner,
    keys: Arc<dyn KeyStore>,
    credentials: Arc<dyn CredentialStore>,
    config: AuthConfig,
}

impl TokenService {
    /// Load the signing key from `config`. A bad key is a configuration error.
    pub fn new(
        config: &AuthConfig,
        keys: Arc<dyn KeyStore>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            signer: PlatformSigner::from_pkcs8_pem(&config.private_key_pem)?,
            keys,
            credentials,
            config: config.clone(),
        })
    }

    pub fn signer(&self) -> &PlatformSigner {
        &self.signer
    }

    pub fn lifetimes_for(&self, platform_id: &str) -> TokenLifetimes {
        self.config.lifetimes_for(platform_id)
    }

    /// Sign an access/refresh pair carrying the same tokenVersion snapshot.
    pub fn issue(
        &self,
        user_id: &str,
        email: &str,
        platform_id: &str,
        project_id: &str,
        token_version: i32,
    ) -> Result<TokenPair, AuthError> {
        self.issue_at(
            user_id,
            email,
            platform_id,
            project_id,
            token_version,
            Utc::now(),
        )
    }

    pub(crate) fn issue_at(
        &self,
        user_id: &str,
        email: &str,
        platform_id: &str,
        project_id: &str,
        token_version: i32,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let lifetimes = self.lifetimes_for(platform_id);
        let claims = |token_type, lifetime: chrono::Duration| TokenClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            platform_id: platform_id.to_string(),
            project_id: project_id.to_string(),
            token_version,
            token_type,
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
        };
        Ok(TokenPair {
            access_token: self.sign(&claims(TokenType::Access, lifetimes.access))?,
            refresh_token: self.sign(&claims(TokenType::Refresh, lifetimes.refresh))?,
            access_expires_in: lifetimes.access.num_seconds(),
            refresh_expires_in: lifetimes.refresh.num_seconds(),
        })
    }

    fn sign(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        encode(
            &Header::new(SIGNING_ALGORITHM),
            claims,
            self.signer.encoding_key(),
        )
        .map_err(|e| AuthError::TokenError(format!("jwt encode: {e}")))
    }

    /// Verify an access token. `Ok(None)` for any invalid token.
    pub async fn verify_access(&self, token: &str) -> Result<Option<TokenClaims>, AuthError> {
        self.verify(token, TokenType::Access).await
    }

    /// Verify a refresh token. `Ok(None)` for any invalid token.
    pub async fn verify_refresh(&self, token: &str) -> Result<Option<TokenClaims>, AuthError> {
        self.verify(token, TokenType::Refresh).await
    }

    /// Exchange a valid refresh token for a new pair stamped with the
    /// current tokenVersion. `Ok(None)` means the caller must re-authenticate.
    ///
    /// Email and project id are carried forward from the old token rather
    /// than re-read, so a session keeps the project it was opened on.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Option<TokenPair>, AuthError> {
        let Some(claims) = self.verify_refresh(refresh_token).await? else {
            return Ok(None);
        };
        // verify() only passes when the embedded version equals the stored one.
        let pair = self.issue(
            &claims.sub,
            &claims.email,
            &claims.platform_id,
            &claims.project_id,
            claims.token_version,
        )?;
        info!(user_id = %claims.sub, platform_id = %claims.platform_id, "rotated token pair");
        Ok(Some(pair))
    }

    async fn verify(
        &self,
        token: &str,
        expected: TokenType,
    ) -> Result<Option<TokenClaims>, AuthError> {
        let Some(platform_id) = peek_platform_id(token) else {
            debug!("rejecting token: undecodable claims");
            return Ok(None);
        };

        let key = match self.keys.public_key(&platform_id).await? {
            Some(key) => key,
            None => {
                if self.credentials.find_platform(&platform_id).await?.is_none() {
                    debug!(%platform_id, "rejecting token: unknown platform");
                    return Ok(None);
                }
                return Err(AuthError::Config(format!(
                    "no signing key registered for platform {platform_id}"
                )));
            }
        };
        if key.algorithm != SIGNING_ALGORITHM {
            return Err(AuthError::Config(format!(
                "platform {platform_id} signing key uses {:?}, expected {:?}",
                key.algorithm, SIGNING_ALGORITHM
            )));
        }
        let decoding_key = DecodingKey::from_rsa_pem(key.public_key.as_bytes()).map_err(|e| {
            AuthError::Config(format!("invalid public key for platform {platform_id}: {e}"))
        })?;

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);
        let claims = match decode::<TokenClaims>(token, &decoding_key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                debug!(%platform_id, error = %e, "rejecting token");
                return Ok(None);
            }
        };

        if claims.platform_id != platform_id {
            debug!(%platform_id, "rejecting token: platform mismatch");
            return Ok(None);
        }
        if claims.token_type != expected {
            debug!(
                expected = expected.as_str(),
                actual = claims.token_type.as_str(),
                "rejecting token: wrong type"
            );
            return Ok(None);
        }

        match self.credentials.token_version(&claims.sub).await? {
            Some(current) if current == claims.token_version => Ok(Some(claims)),
            current => {
                debug!(
                    user_id = %claims.sub,
                    token_version = claims.token_version,
                    ?current,
                    "rejecting token: revoked"
                );
                Ok(None)
            }
        }
    }
}

/// Read `platformId` from a token's payload without verifying it.
///
/// The result only selects a verification key; it must not be trusted for
/// anything else.
pub fn peek_platform_id(token: &str) -> Option<String> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct PlatformHint {
        platform_id: String,
    }

    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice::<PlatformHint>(&bytes)
        .ok()
        .map(|hint| hint.platform_id)
        .filter(|id| !id.is_empty())
}
