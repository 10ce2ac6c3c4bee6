//! PKCE challenge and anti-forgery state generation
//!
//! RFC 7636 verifier/challenge pairs for public clients, plus the
//! cryptographically random `state` value used to correlate an authorization
//! request with its callback.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// PKCE verifier/challenge pair.
///
/// The verifier stays with the pending login until token exchange; the
/// challenge travels in the authorization request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkcePair {
    /// Random secret, 43 base64url characters (within the RFC 7636 43-128
    /// character window).
    pub verifier: String,

    /// `BASE64URL(SHA256(verifier))`, sent with the authorization request.
    pub challenge: String,
}

impl PkcePair {
    /// Generate a fresh pair from 32 bytes of OS randomness.
    #[must_use]
    pub fn generate() -> Self {
        let verifier = random_urlsafe(32);
        let challenge = challenge_for(&verifier);
        Self { verifier, challenge }
    }

    /// The challenge method, always S256.
    #[must_use]
    pub const fn method() -> &'static str {
        "S256"
    }
}

/// Compute the S256 challenge for a verifier.
#[must_use]
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Generate a single-use anti-forgery `state` value.
#[must_use]
pub fn random_state() -> String {
    random_urlsafe(32)
}

fn random_urlsafe(bytes: usize) -> String {
    let mut buffer = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buffer);
    URL_SAFE_NO_PAD.encode(buffer)
}
