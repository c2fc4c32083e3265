use sha2::{Digest, Sha256};

use crate::util::{base64_url_encode_bytes, random_url_safe};

const VERIFIER_LENGTH: usize = 64;

pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// PKCE verifier and its S256 challenge (RFC 7636).
#[derive(Debug, Clone)]
pub struct PkcePair {
    code_verifier: String,
    code_challenge: String,
}

impl PkcePair {
    pub fn generate() -> Self {
        Self::from_verifier(random_url_safe(VERIFIER_LENGTH))
    }

    pub fn from_verifier(code_verifier: impl Into<String>) -> Self {
        let code_verifier = code_verifier.into();
        let code_challenge = base64_url_encode_bytes(&Sha256::digest(code_verifier.as_bytes()));
        Self {
            code_verifier,
            code_challenge,
        }
    }

    pub fn code_verifier(&self) -> &str {
        &self.code_verifier
    }

    pub fn code_challenge(&self) -> &str {
        &self.code_challenge
    }

    pub fn into_verifier(self) -> String {
        self.code_verifier
    }
}
