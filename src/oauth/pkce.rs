// ABOUTME: PKCE material — code verifier, S256 challenge, and the anti-forgery state token.
// ABOUTME: All randomness comes from the OS CSPRNG; encoding is base64url without padding.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Bytes of entropy behind the verifier and the state token (256 bits).
const TOKEN_ENTROPY_BYTES: usize = 32;

/// The challenge method sent alongside the challenge.
pub const CHALLENGE_METHOD: &str = "S256";

/// A PKCE verifier/challenge pair bound to one authorization attempt.
#[derive(Clone)]
pub struct PkcePair {
    /// URL-safe encoded random verifier; sent only to the token endpoint.
    pub verifier: String,
    /// base64url(SHA-256(verifier)); sent in the authorization URL.
    pub challenge: String,
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The verifier is a secret for the attempt's lifetime.
        f.debug_struct("PkcePair")
            .field("challenge", &self.challenge)
            .finish_non_exhaustive()
    }
}

/// Generate a fresh verifier and derive its S256 challenge.
pub fn generate_pkce() -> PkcePair {
    let mut bytes = [0u8; TOKEN_ENTROPY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let verifier = URL_SAFE_NO_PAD.encode(bytes);
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
    PkcePair {
        verifier,
        challenge,
    }
}

/// Generate the random anti-forgery state token, independent of the verifier.
pub fn generate_state() -> String {
    let mut bytes = [0u8; TOKEN_ENTROPY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
