use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Compute SHA256 hash of input bytes
pub fn sha256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hasher.finalize().into()
}

/// Hex-encoded SHA-256 of a secret. This is the fingerprint stored in place of
/// refresh tokens.
pub fn sha256_hex(input: &str) -> String {
    hex::encode(sha256(input.as_bytes()))
}

/// Compare two fingerprints without short-circuiting on the first differing byte
pub fn fingerprints_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
