//! Platform signing keys.
//!
//! The private key is process-wide: loaded once from configuration (PKCS8
//! PEM) and never written to storage. Each platform gets a [`SigningKey`]
//! row holding only the matching public key (SPKI PEM), which is what token
//! verification resolves through the [`crate::store::KeyStore`].
//!
//! The algorithm is fixed to RS256. Verification refuses any other.

use std::fmt;

use jsonwebtoken::{Algorithm, EncodingKey};
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};

use super::AuthError;
use crate::models::auth::SigningKey;

/// The only signing algorithm issued or accepted.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;

/// Process-wide RSA signing key plus its derived public PEM.
pub struct PlatformSigner {
    encoding_key: EncodingKey,
    public_key_pem: String,
}

impl fmt::Debug for PlatformSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformSigner")
            .field("algorithm", &SIGNING_ALGORITHM)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl PlatformSigner {
    /// Load from a PKCS8 PEM private key. Any failure is a configuration error.
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, AuthError> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| AuthError::Config(format!("invalid JWT private key: {e}")))?;
        let public_key_pem = RsaPublicKey::from(&private)
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AuthError::Config(format!("derive JWT public key: {e}")))?;
        let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::Config(format!("invalid JWT private key: {e}")))?;
        Ok(Self {
            encoding_key,
            public_key_pem,
        })
    }

    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    /// Key Store record registering this signer's public key for a platform.
    pub fn signing_key_for(&self, platform_id: &str, platform_name: &str) -> SigningKey {
        SigningKey {
            platform_id: platform_id.to_string(),
            public_key: self.public_key_pem.clone(),
            algorithm: SIGNING_ALGORITHM,
            display_name: format!("{platform_name} signing key"),
        }
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{OTHER_SIGNING_KEY_PEM, SIGNING_KEY_PEM};

    #[test]
    fn derives_spki_public_key() {
        let signer = PlatformSigner::from_pkcs8_pem(SIGNING_KEY_PEM).unwrap();
        assert!(signer.public_key_pem().starts_with("-----BEGIN PUBLIC KEY-----"));
        assert!(jsonwebtoken::DecodingKey::from_rsa_pem(signer.public_key_pem().as_bytes()).is_ok());
    }

    #[test]
    fn different_private_keys_give_different_public_keys() {
        let a = PlatformSigner::from_pkcs8_pem(SIGNING_KEY_PEM).unwrap();
        let b = PlatformSigner::from_pkcs8_pem(OTHER_SIGNING_KEY_PEM).unwrap();
        assert_ne!(a.public_key_pem(), b.public_key_pem());
    }

    #[test]
    fn garbage_pem_is_a_config_error() {
        let err = PlatformSigner::from_pkcs8_pem("not a key").unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
    }

    #[test]
    fn signing_key_record_is_rs256() {
        let signer = PlatformSigner::from_pkcs8_pem(SIGNING_KEY_PEM).unwrap();
        let key = signer.signing_key_for("p1", "Acme");
        assert_eq!(key.platform_id, "p1");
        assert_eq!(key.algorithm, Algorithm::RS256);
        assert_eq!(key.display_name, "Acme signing key");
        assert_eq!(key.public_key, signer.public_key_pem());
    }

    #[test]
    fn debug_does_not_leak_key_material() {
        let signer = PlatformSigner::from_pkcs8_pem(SIGNING_KEY_PEM).unwrap();
        assert!(!format!("{signer:?}").contains("PRIVATE"));
    }
}
