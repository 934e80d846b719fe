//! PKCE (Proof Key for Code Exchange) verification.
//!
//! Implements `plain` and `S256` code challenge verification per RFC 7636.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// Minimum verifier/challenge length (RFC 7636 §4.1).
const MIN_LENGTH: usize = 43;
/// Maximum verifier/challenge length.
const MAX_LENGTH: usize = 128;

/// Compute the S256 challenge for a verifier: `BASE64URL(SHA256(code_verifier))`.
#[must_use]
pub fn s256_challenge(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}

/// Verify a PKCE S256 code challenge.
#[must_use]
pub fn verify_s256(code_verifier: &str, code_challenge: &str) -> bool {
    is_well_formed(code_verifier) && constant_time_eq(&s256_challenge(code_verifier), code_challenge)
}

/// Verify a PKCE plain code challenge.
#[must_use]
pub fn verify_plain(code_verifier: &str, code_challenge: &str) -> bool {
    is_well_formed(code_verifier) && constant_time_eq(code_verifier, code_challenge)
}

/// 43-128 characters from the unreserved set `[A-Za-z0-9-._~]`.
///
/// Applies to verifiers and, since an S256 challenge is 43 base64url
/// characters, to challenges as well.
#[must_use]
pub fn is_well_formed(value: &str) -> bool {
    (MIN_LENGTH..=MAX_LENGTH).contains(&value.len())
        && value.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

/// Compare two strings without short-circuiting on the first differing byte.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
