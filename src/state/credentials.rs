//! Password hashing for gateway accounts.
//!
//! Stored credentials are argon2 PHC strings; verification uses whatever
//! parameters are encoded in the stored hash.

use argon2::password_hash::SaltString;
use argon2::{Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier};

use super::AuthError;

/// Hash a password with the default argon2id parameters.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    hash_password_with(password, Params::default())
}

/// Hash a password with explicit cost parameters.
pub fn hash_password_with(password: &str, params: Params) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::MalformedHash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC string.
pub fn verify_password(password: &str, stored: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(stored).map_err(|e| AuthError::MalformedHash(e.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::BadPassword)
}

#[cfg(test)]
pub(crate) fn cheap_hash(password: &str) -> String {
    let params = Params::new(1024, 1, 1, None).unwrap();
    hash_password_with(password, params).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_roundtrip() {
        let stored = cheap_hash("secret");
        assert!(stored.starts_with("$argon2id$"));
        assert!(verify_password("secret", &stored).is_ok());
        assert!(matches!(
            verify_password("wrong", &stored),
            Err(AuthError::BadPassword)
        ));
    }

    #[test]
    fn test_malformed_hash() {
        assert!(matches!(
            verify_password("secret", "not-a-hash"),
            Err(AuthError::MalformedHash(_))
        ));
    }
}
