/// Password hashing and verification using Argon2id
use crate::error::{IdentityError, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier as _, SaltString},
    Argon2,
};
use async_trait::async_trait;

/// Well-formed Argon2id hash with default cost parameters that no password matches.
///
/// Login verifies against it when the email is unknown so both failure paths
/// pay the same hashing cost.
pub const DUMMY_PASSWORD_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$eJv5jqFQuyV9SGb7PpI55Q$sbBew+I7WeSdd9f087QzjhGFVoJR5DdBwjC6EyrsUt8";

/// Opaque password check used by login.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PasswordVerifier: Send + Sync {
    /// `Ok(false)` on mismatch; `Err` only when the stored hash is unusable.
    async fn verify(&self, stored_hash: &str, candidate: &str) -> Result<bool>;
}

/// Argon2id verifier over PHC-formatted hashes
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2PasswordVerifier;

#[async_trait]
impl PasswordVerifier for Argon2PasswordVerifier {
    async fn verify(&self, stored_hash: &str, candidate: &str) -> Result<bool> {
        let stored_hash = stored_hash.to_owned();
        let candidate = candidate.to_owned();

        // Argon2 is deliberately slow; keep it off the async workers.
        tokio::task::spawn_blocking(move || verify_password(&candidate, &stored_hash))
            .await
            .map_err(|e| IdentityError::Internal(format!("Password verification task failed: {}", e)))?
    }
}

/// Hash a password using Argon2id algorithm
///
/// ## Security
///
/// - Algorithm: Argon2id (default configuration)
/// - Salt: Random 16-byte salt generated per password
///
/// ## Returns
///
/// PHC-formatted hash string safe for database storage
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| IdentityError::Internal(format!("Password hashing failed: {}", e)))?
        .to_string();

    Ok(password_hash)
}

/// Verify a password against its hash
///
/// ## Security
///
/// - Uses constant-time comparison to prevent timing attacks
/// - Supports Argon2id PHC format
///
/// ## Returns
///
/// `true` if password matches hash, `false` otherwise
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| IdentityError::Internal(format!("Invalid password hash format: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(IdentityError::Internal(format!(
            "Password verification failed: {}",
            e
        ))),
    }
}
