use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::engine::Engine as _;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeBase64Error;

impl fmt::Display for DecodeBase64Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to decode base64url string")
    }
}

impl std::error::Error for DecodeBase64Error {}

/// Encodes bytes with the unpadded base64url alphabet used by JOSE and PKCE.
pub fn base64_url_encode_bytes(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Encodes a string with the unpadded base64url alphabet.
pub fn base64_url_encode(input: &str) -> String {
    base64_url_encode_bytes(input.as_bytes())
}

/// Decodes base64url text, accepting input with or without `=` padding.
pub fn base64_url_decode_bytes(input: &str) -> Result<Vec<u8>, DecodeBase64Error> {
    let trimmed = input.trim_end_matches('=');
    let mut normalized = trimmed.to_string();
    // Restore padding so the padded decoder also accepts odd-length segments.
    let remainder = normalized.len() % 4;
    if remainder != 0 {
        normalized.extend("===".chars().take(4 - remainder));
    }
    URL_SAFE
        .decode(normalized.as_bytes())
        .map_err(|_err| DecodeBase64Error)
}

/// Decodes base64url text into UTF-8.
pub fn base64_url_decode(input: &str) -> Result<String, DecodeBase64Error> {
    let bytes = base64_url_decode_bytes(input)?;
    String::from_utf8(bytes).map_err(|_err| DecodeBase64Error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_has_no_padding() {
        let encoded = base64_url_encode("test");
        assert_eq!(encoded, "dGVzdA");
    }

    #[test]
    fn decode_tolerates_missing_padding() {
        assert_eq!(base64_url_decode("dGVzdA").unwrap(), "test");
        assert_eq!(base64_url_decode("dGVzdA==").unwrap(), "test");
    }

    #[test]
    fn decode_invalid_returns_error() {
        assert!(base64_url_decode("@@invalid@@").is_err());
    }
}
