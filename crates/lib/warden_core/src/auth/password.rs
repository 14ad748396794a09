//! Password hashing via bcrypt, with a fallback for legacy PBKDF2 hashes.
//!
//! Stored hashes come in two shapes:
//! - bcrypt (`$2b$10$...`), the primary format;
//! - `salt:derivedHash`, hex PBKDF2-HMAC-SHA512 written by the previous
//!   system. The colon is what tells the two apart.
//!
//! A successful legacy match is reported as [`PasswordCheck::Legacy`] so the
//! caller can re-hash and persist the password in the primary format.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha512;

use super::AuthError;

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

/// PBKDF2 iteration count used by legacy hashes.
const LEGACY_ITERATIONS: u32 = 10_000;

/// Derived key length (bytes) of legacy hashes.
const LEGACY_KEY_LEN: usize = 64;

/// Outcome of checking a password against a stored hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordCheck {
    /// Matched a bcrypt hash.
    Primary,
    /// Matched a legacy hash; the caller should re-hash.
    Legacy,
    Mismatch,
}

impl PasswordCheck {
    pub fn is_match(self) -> bool {
        !matches!(self, PasswordCheck::Mismatch)
    }

    pub fn needs_rehash(self) -> bool {
        matches!(self, PasswordCheck::Legacy)
    }
}

/// Hash a password with bcrypt (cost 10).
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Verify a password against a stored hash of either format.
pub fn verify_password(password: &str, stored: &str) -> bool {
    check_password(password, stored).is_match()
}

/// Check a password, reporting which format matched.
///
/// Malformed hashes count as a mismatch; nothing here returns an error.
pub fn check_password(password: &str, stored: &str) -> PasswordCheck {
    if bcrypt::verify(password, stored).unwrap_or(false) {
        return PasswordCheck::Primary;
    }
    if is_legacy_hash(stored) && verify_legacy(password, stored) {
        return PasswordCheck::Legacy;
    }
    PasswordCheck::Mismatch
}

/// Whether a stored hash uses the legacy `salt:derivedHash` layout.
pub fn is_legacy_hash(stored: &str) -> bool {
    stored.contains(':')
}

fn verify_legacy(password: &str, stored: &str) -> bool {
    let Some((salt, derived_hex)) = stored.split_once(':') else {
        return false;
    };
    let Ok(expected) = hex::decode(derived_hex) else {
        return false;
    };
    if salt.is_empty() || expected.len() != LEGACY_KEY_LEN {
        return false;
    }
    let mut derived = [0u8; LEGACY_KEY_LEN];
    // The salt is the hex text itself, not its decoded bytes.
    pbkdf2_hmac::<Sha512>(
        password.as_bytes(),
        salt.as_bytes(),
        LEGACY_ITERATIONS,
        &mut derived,
    );
    constant_time_eq(&derived, &expected)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::LEGACY_PW123;

    #[test]
    fn bcrypt_hash_verifies_on_primary_path() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$2"));
        assert!(!is_legacy_hash(&hash));
        assert_eq!(check_password("correct horse", &hash), PasswordCheck::Primary);
        assert_eq!(check_password("wrong horse", &hash), PasswordCheck::Mismatch);
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("same", &a));
        assert!(verify_password("same", &b));
    }

    #[test]
    fn legacy_hash_verifies_and_asks_for_rehash() {
        let check = check_password("pw123", LEGACY_PW123);
        assert_eq!(check, PasswordCheck::Legacy);
        assert!(check.needs_rehash());
        assert!(verify_password("pw123", LEGACY_PW123));
    }

    #[test]
    fn legacy_hash_rejects_wrong_password() {
        assert_eq!(check_password("pw124", LEGACY_PW123), PasswordCheck::Mismatch);
    }

    #[test]
    fn malformed_hashes_are_mismatches() {
        for stored in [
            "",
            "not-a-hash",
            "a1b2:zz-not-hex",
            ":abcd",
            "a1b2:abcd",
            "$2b$10$truncated",
        ] {
            assert_eq!(check_password("pw123", stored), PasswordCheck::Mismatch, "{stored}");
        }
    }

    #[test]
    fn constant_time_eq_requires_equal_length() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
