//! Argon2id password hashing and verification.

use anyhow::{anyhow, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use rand::rngs::OsRng;

/// PHC hash verified on unknown-email logins so the miss path performs the
/// same amount of work as a real mismatch. Any well-formed hash will do; the
/// comparison always fails.
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$MDEyMzQ1Njc4OWFiY2RlZg$GVSLw4TXM7yjFJcZHZWhGYvqQbCWWgLjBBt0rzLrpmM";

/// Hash a password into a PHC-format argon2id string.
///
/// # Errors
/// Returns an error if salt generation or hashing fails.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("failed to hash password: {e}"))?
        .to_string();
    Ok(phc)
}

/// Verify a password against a stored PHC hash.
///
/// An unparsable stored hash verifies as false rather than erroring; a
/// corrupt row must not be distinguishable from a wrong password.
#[must_use]
pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else {
        false
    }
}

/// Burn a verification against a fixed hash. Used when the account lookup
/// misses, so response timing does not reveal whether the email exists.
pub fn burn_verification(password: &str) {
    let _ = verify_password(DUMMY_HASH, password);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trips() {
        let hash = hash_password("correct horse").expect("hash");
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(&hash, "correct horse"));
        assert!(!verify_password(&hash, "wrong horse"));
    }

    #[test]
    fn verify_rejects_malformed_hash() {
        assert!(!verify_password("not-a-phc-string", "anything"));
        assert!(!verify_password("", "anything"));
    }

    #[test]
    fn hashes_are_salted() {
        let first = hash_password("same input").expect("hash");
        let second = hash_password("same input").expect("hash");
        assert_ne!(first, second);
    }

    #[test]
    fn burn_verification_does_not_panic() {
        burn_verification("anything at all");
    }
}
