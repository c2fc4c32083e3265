//! Unverified JWT decoding.
//!
//! Signature checks live in `validation::id_token`; these helpers only peek at
//! the header and payload, e.g. to read `sub`/`sid` from an ID token hint.

use crate::util::base64::base64_url_decode;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default)]
pub struct DecodedToken {
    pub header: Map<String, Value>,
    pub claims: Map<String, Value>,
    pub signature: String,
}

/// Splits and decodes a compact JWS. Returns `None` when the token is not a
/// three-part JWT with JSON object header and payload.
pub fn decode_jwt(token: &str) -> Option<DecodedToken> {
    let mut parts = token.split('.');
    let header_part = parts.next()?;
    let claims_part = parts.next()?;
    let signature = parts.next()?.to_string();
    if parts.next().is_some() {
        return None;
    }

    Some(DecodedToken {
        header: decode_part(header_part)?,
        claims: decode_part(claims_part)?,
        signature,
    })
}

/// Returns the decoded payload of a JWT, if it has one.
pub fn jwt_claims(token: &str) -> Option<Map<String, Value>> {
    decode_jwt(token).map(|decoded| decoded.claims)
}

fn decode_part(part: &str) -> Option<Map<String, Value>> {
    let decoded = base64_url_decode(part).ok()?;
    match serde_json::from_str::<Value>(&decoded).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

pub fn value_as_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_u64().map(|v| v as i64))
        .or_else(|| value.as_f64().map(|v| v as i64))
}
