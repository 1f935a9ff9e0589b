use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand_core::OsRng;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Password hashing error")]
    Hashing,
    #[error("Password does not match")]
    Mismatch,
}

/// Hash a password with Argon2id (default parameters) and a fresh random salt.
///
/// The result is a PHC string that embeds the algorithm, parameters and salt,
/// so hashing the same password twice yields two different strings.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| PasswordError::Hashing)?;

    Ok(hash.to_string())
}

/// Verify a password against a stored PHC hash.
///
/// A malformed hash is reported the same way as a wrong password.
pub fn verify_password(password: &str, hash: &str) -> Result<(), PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::Mismatch)?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| PasswordError::Mismatch)
}
