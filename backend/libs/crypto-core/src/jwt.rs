//! Access-token signing and verification for Nova services
//!
//! Access tokens are RS256 JWTs. The private key only lives in the service that
//! issues tokens (identity-service); every other service holds a
//! [`TokenVerifier`] built from the public key alone.
//!
//! ## Security Design
//!
//! - **RS256 ONLY**: tokens carrying any other `alg` header are rejected, which
//!   closes the HS256-with-public-key confusion attack
//! - **No global state**: keys are owned by the signer/verifier instances that
//!   the caller constructs at startup and shares behind an `Arc`
//! - **Refresh tokens are opaque**: they are random bytes, never JWTs, and only
//!   their SHA-256 fingerprint is persisted
//!
//! ## Usage
//!
//! ```rust,no_run
//! use crypto_core::jwt::TokenSigner;
//! use std::time::Duration;
//!
//! # fn run(private_pem: &str, public_pem: &str) -> Result<(), crypto_core::jwt::TokenError> {
//! let signer = TokenSigner::from_rsa_pem(private_pem, public_pem, "nova-platform", Duration::from_secs(900))?;
//! let token = signer.generate_access_token("4b1c9f0e-8d9a-4a53-9d53-3c9e64b3a0a7", Some("user"))?;
//! let claims = signer.verifier().parse_access_token(&token)?;
//! assert_eq!(claims.sub, "4b1c9f0e-8d9a-4a53-9d53-3c9e64b3a0a7");
//! # Ok(())
//! # }
//! ```
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// JWT algorithm - MUST be RS256 for all Nova services
const JWT_ALGORITHM: Algorithm = Algorithm::RS256;

const ACCESS_TOKEN_TYPE: &str = "access";

/// Entropy of a refresh token in bytes (256 bits)
pub const REFRESH_TOKEN_BYTES: usize = 32;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error("invalid key material: {0}")]
    Key(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::InvalidKeyFormat
            | ErrorKind::InvalidIssuer => TokenError::InvalidSignature,
            _ => TokenError::Malformed,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Claims carried by an access token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID as string)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique token id, keeps two tokens minted in the same second distinct
    pub jti: String,
    /// Issuer
    pub iss: String,
    /// Token type, always "access"
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Freshly minted refresh-token material.
///
/// `plaintext` is handed to the client exactly once; callers persist only
/// `hash::sha256_hex(&plaintext)`.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub session_id: String,
    pub plaintext: String,
}

impl std::fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshToken")
            .field("session_id", &self.session_id)
            .field("plaintext", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// Verification
// ============================================================================

/// Public-key half of the token pair. Safe to hand to any service.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    issuer: String,
}

impl TokenVerifier {
    /// Build a verifier from an RSA public key in PEM format
    pub fn from_rsa_pem(public_key_pem: &str, issuer: impl Into<String>) -> Result<Self, TokenError> {
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| TokenError::Key(format!("failed to parse RSA public key: {e}")))?;

        Ok(Self {
            decoding_key,
            issuer: issuer.into(),
        })
    }

    /// Validate signature, issuer and expiry.
    ///
    /// ## Errors
    ///
    /// - `Malformed` for anything that is not a well-formed access token
    /// - `InvalidSignature` for a bad signature, a foreign issuer or a non-RS256 `alg`
    /// - `Expired` once `exp` is in the past
    pub fn parse_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode_claims(token, true)
    }

    /// Same as [`parse_access_token`](Self::parse_access_token) but an elapsed
    /// `exp` is accepted. Used when a server-side session, not the token's own
    /// lifetime, is the authority (token refresh).
    pub fn parse_access_token_allow_expired(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode_claims(token, false)
    }

    fn decode_claims(&self, token: &str, validate_exp: bool) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.validate_exp = validate_exp;
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation)?;

        if data.claims.token_type != ACCESS_TOKEN_TYPE || data.claims.sub.is_empty() {
            return Err(TokenError::Malformed);
        }

        Ok(data.claims)
    }
}

// ============================================================================
// Signing
// ============================================================================

/// Issues access tokens. Holds the private key, so only identity-service builds one.
pub struct TokenSigner {
    encoding_key: EncodingKey,
    verifier: TokenVerifier,
    access_ttl: Duration,
}

impl TokenSigner {
    /// Build a signer from an RSA key pair in PEM format.
    ///
    /// ## Errors
    ///
    /// `TokenError::Key` if either PEM does not parse as an RSA key, or if the
    /// access TTL is zero.
    pub fn from_rsa_pem(
        private_key_pem: &str,
        public_key_pem: &str,
        issuer: impl Into<String>,
        access_ttl: Duration,
    ) -> Result<Self, TokenError> {
        if access_ttl.is_zero() {
            return Err(TokenError::Key("access token TTL must be positive".to_string()));
        }

        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| TokenError::Key(format!("failed to parse RSA private key: {e}")))?;
        let verifier = TokenVerifier::from_rsa_pem(public_key_pem, issuer)?;

        Ok(Self {
            encoding_key,
            verifier,
            access_ttl,
        })
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Generate a signed access token for `subject`, expiring after the configured TTL
    pub fn generate_access_token(&self, subject: &str, role: Option<&str>) -> Result<String, TokenError> {
        self.sign_with_ttl(subject, role, self.access_ttl_secs())
    }

    fn access_ttl_secs(&self) -> i64 {
        i64::try_from(self.access_ttl.as_secs()).unwrap_or(i64::MAX)
    }

    fn sign_with_ttl(&self, subject: &str, role: Option<&str>, ttl_secs: i64) -> Result<String, TokenError> {
        if subject.trim().is_empty() {
            return Err(TokenError::Signing("cannot sign a token without a subject".to_string()));
        }

        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp: now.saturating_add(ttl_secs),
            jti: Uuid::new_v4().to_string(),
            iss: self.verifier.issuer.clone(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
            role: role.map(str::to_string),
        };

        encode(&Header::new(JWT_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(format!("failed to sign access token: {e}")))
    }
}

// ============================================================================
// Refresh tokens and bearer headers
// ============================================================================

/// Generate a session id (UUIDv4) plus 256 bits of OS randomness, base64 encoded
pub fn generate_refresh_token() -> Result<RefreshToken, TokenError> {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| TokenError::Signing(format!("OS random generator failed: {e}")))?;

    Ok(RefreshToken {
        session_id: Uuid::new_v4().to_string(),
        plaintext: STANDARD_NO_PAD.encode(bytes),
    })
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn extract_bearer_token(header_value: &str) -> Result<&str, TokenError> {
    let (scheme, token) = header_value
        .trim()
        .split_once(' ')
        .ok_or(TokenError::Malformed)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(TokenError::Malformed);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(TokenError::Malformed);
    }

    Ok(token)
}

// ============================================================================
// Tests
// ============================================================================
