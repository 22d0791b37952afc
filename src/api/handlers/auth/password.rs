//! Password hashing and verification on top of Argon2id.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use thiserror::Error;

// OWASP-recommended memory size; the iteration count is the tunable knob.
const MEMORY_KIB: u32 = 19_456;
const PARALLELISM: u32 = 1;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid hash parameters")]
    Params,
    #[error("failed to hash password")]
    Hash,
}

fn hasher(iterations: u32) -> Result<Argon2<'static>, Error> {
    let params = Params::new(MEMORY_KIB, iterations.max(1), PARALLELISM, None)
        .map_err(|_| Error::Params)?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password into a PHC string with a fresh random salt.
///
/// The iteration count is embedded in the hash, so verification does not need
/// the configuration value the hash was created with.
pub fn hash_password(password: &str, iterations: u32) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher(iterations)?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| Error::Hash)?;
    Ok(hash.to_string())
}

/// Verify a password against a stored PHC hash.
///
/// Comparison happens inside the Argon2 verifier and does not early-exit on
/// the first mismatched byte. The raw password is never logged; a malformed
/// stored hash verifies as false rather than erroring, so callers cannot
/// distinguish it from a wrong password.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::{hash_password, verify_password};
    use anyhow::Result;

    #[test]
    fn hash_then_verify_round_trip() -> Result<()> {
        let hash = hash_password("chalk-and-slate", 1)?;
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("chalk-and-slate", &hash));
        Ok(())
    }

    #[test]
    fn verify_rejects_wrong_password() -> Result<()> {
        let hash = hash_password("chalk-and-slate", 1)?;
        assert!(!verify_password("chalk-and-slates", &hash));
        assert!(!verify_password("", &hash));
        Ok(())
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", ""));
    }

    #[test]
    fn hashes_are_salted() -> Result<()> {
        let first = hash_password("same-password", 1)?;
        let second = hash_password("same-password", 1)?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn zero_iterations_clamped_to_valid() -> Result<()> {
        let hash = hash_password("edge", 0)?;
        assert!(verify_password("edge", &hash));
        Ok(())
    }
}
