/// Security module for authentication
///
/// Provides the security primitives identity-service composes:
/// - Password hashing and verification (Argon2id)
/// - Access-token signing and verification (RS256 via crypto-core)
/// - Refresh-token fingerprints (SHA-256 via crypto-core)
///
/// ## Architecture
///
/// - **crypto-core::jwt**: Shared JWT implementation (RS256 only)
/// - **password**: Argon2id password hashing behind the `PasswordVerifier` trait
pub use crypto_core::hash::{fingerprints_match, sha256_hex as fingerprint};
pub use crypto_core::jwt;
pub use crypto_core::jwt::{generate_refresh_token, Claims, RefreshToken, TokenSigner, TokenVerifier};

pub mod password;

pub use password::{
    hash_password, verify_password, Argon2PasswordVerifier, PasswordVerifier, DUMMY_PASSWORD_HASH,
};
