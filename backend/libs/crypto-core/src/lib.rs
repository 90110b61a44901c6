//! Cryptographic primitives shared by Nova services.
//!
//! - `jwt`: RS256 access-token signing/verification and opaque refresh-token material
//! - `hash`: SHA-256 fingerprints for secrets that must never be stored verbatim

pub mod hash;
pub mod jwt;

pub use jwt::{Claims, RefreshToken, TokenError, TokenSigner, TokenVerifier};
