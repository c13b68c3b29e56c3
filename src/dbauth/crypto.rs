//! Password hashing and random token helpers.
//!
//! Passwords are hashed with Argon2id using a per-user random salt that is
//! stored next to the hash. Session and reset tokens are random 32-byte values;
//! only their SHA-256 digests are persisted.

use anyhow::{Context, Result, anyhow};
use argon2::Argon2;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

fn random_token(bytes: usize) -> Result<String> {
    let mut buf = vec![0u8; bytes];
    OsRng
        .try_fill_bytes(&mut buf)
        .context("failed to generate random bytes")?;
    Ok(URL_SAFE_NO_PAD.encode(buf))
}

/// Generate a salt suitable for [`hash_password`].
pub fn generate_salt() -> Result<String> {
    random_token(SALT_LEN)
}

/// # Errors
/// Returns an error if the salt is too short for Argon2.
pub fn hash_password(password: &str, salt: &str) -> Result<String> {
    let mut out = [0u8; HASH_LEN];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut out)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?;
    Ok(URL_SAFE_NO_PAD.encode(out))
}

/// Check a candidate password against a stored hash and salt.
pub fn verify_password(password: &str, salt: &str, hashed_password: &str) -> bool {
    let Ok(candidate) = hash_password(password, salt) else {
        return false;
    };
    // Compare every byte so timing does not depend on the first mismatch.
    candidate.len() == hashed_password.len()
        && candidate
            .bytes()
            .zip(hashed_password.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// Random value for the session cookie; the store only sees its hash.
pub fn generate_session_token() -> Result<String> {
    random_token(32)
}

/// Random value embedded in the password-reset link.
pub fn generate_reset_token() -> Result<String> {
    random_token(32)
}

pub fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_username_trims_and_lowercases() {
        assert_eq!(normalize_username(" Ada@Example.COM "), "ada@example.com");
    }

    #[test]
    fn hash_and_verify() -> Result<()> {
        let salt = generate_salt()?;
        let hashed = hash_password("correct horse", &salt)?;
        assert!(verify_password("correct horse", &salt, &hashed));
        assert!(!verify_password("battery staple", &salt, &hashed));
        Ok(())
    }

    #[test]
    fn same_password_different_salt_differs() -> Result<()> {
        let first = hash_password("pw", &generate_salt()?)?;
        let second = hash_password("pw", &generate_salt()?)?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn empty_password_still_hashes() -> Result<()> {
        let salt = generate_salt()?;
        let hashed = hash_password("", &salt)?;
        assert!(verify_password("", &salt, &hashed));
        Ok(())
    }

    #[test]
    fn tokens_are_32_random_bytes() -> Result<()> {
        let token = generate_session_token()?;
        assert_eq!(URL_SAFE_NO_PAD.decode(token.as_bytes())?.len(), 32);
        assert_ne!(generate_reset_token()?, generate_reset_token()?);
        Ok(())
    }

    #[test]
    fn hash_token_is_stable() {
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_ne!(hash_token("abc"), hash_token("abd"));
        assert_eq!(hash_token("abc").len(), 32);
    }
}
