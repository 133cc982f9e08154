//! PKCE (RFC 7636) material for the OAuth popup sign-in.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// One-shot PKCE parameters for a single popup authorization.
///
/// The verifier never leaves the process; only the challenge and the state
/// are put on the authorization URL.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
    pub state: String,
}

impl PkceChallenge {
    /// Generate a fresh verifier, its S256 challenge and a CSRF state value.
    #[must_use]
    pub fn generate() -> Self {
        let verifier = random_urlsafe::<48>();
        let challenge = s256(&verifier);
        Self {
            verifier,
            challenge,
            state: random_urlsafe::<16>(),
        }
    }

    /// Constant-time comparison of the state echoed back by the popup.
    #[must_use]
    pub fn state_matches(&self, received: &str) -> bool {
        let expected = self.state.as_bytes();
        let received = received.as_bytes();
        if expected.len() != received.len() {
            return false;
        }
        expected
            .iter()
            .zip(received)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// `BASE64URL(SHA256(verifier))`
#[must_use]
pub fn s256(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn random_urlsafe<const N: usize>() -> String {
    let bytes: [u8; N] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}
