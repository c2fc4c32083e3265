//! JWS verification of ID tokens and signed UserInfo responses.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{token_validation, OidcError, OidcResult};
use crate::metadata::SigningKey;
use crate::util::{epoch_seconds, jwt_claims, value_as_i64};

#[derive(Debug, Deserialize)]
struct JwkEntry {
    #[serde(default)]
    kid: Option<String>,
    kty: String,
    #[serde(default, rename = "use")]
    key_use: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
    #[serde(default)]
    x: Option<String>,
    #[serde(default)]
    y: Option<String>,
}

/// What a signed token must satisfy besides its signature.
#[derive(Debug, Clone, Copy)]
pub struct JwtExpectations<'a> {
    /// `None` skips the issuer check.
    pub issuer: Option<&'a str>,
    pub audience: &'a str,
    pub clock_skew: u64,
    pub require_exp: bool,
}

/// Verifies the signature of `token` against `keys` and checks `iss`, `aud`,
/// `exp` and `nbf`. Returns the payload.
pub fn verify_jwt(
    token: &str,
    keys: &[SigningKey],
    expectations: JwtExpectations<'_>,
) -> OidcResult<Map<String, Value>> {
    let header =
        decode_header(token).map_err(|err| token_validation(format!("Invalid JWT header: {err}")))?;
    let key = select_key(header.alg, header.kid.as_deref(), keys)?;

    let mut validation = Validation::new(header.alg);
    validation.set_audience(&[expectations.audience]);
    if let Some(issuer) = expectations.issuer {
        validation.set_issuer(&[issuer]);
    }
    validation.leeway = expectations.clock_skew;
    validation.validate_exp = expectations.require_exp;
    validation.validate_nbf = true;
    if expectations.require_exp {
        validation.set_required_spec_claims(&["exp", "sub"]);
    } else {
        validation.set_required_spec_claims(&["sub"]);
    }

    match decode::<Map<String, Value>>(token, &key, &validation) {
        Ok(data) => Ok(data.claims),
        Err(err) => Err(map_decode_error(token, err)),
    }
}

/// Full ID token validation: [`verify_jwt`] plus `iat`, `azp` and `nonce`.
pub fn validate_id_token(
    token: &str,
    keys: &[SigningKey],
    issuer: &str,
    client_id: &str,
    nonce: Option<&str>,
    clock_skew: u64,
) -> OidcResult<Map<String, Value>> {
    let claims = verify_jwt(
        token,
        keys,
        JwtExpectations {
            issuer: Some(issuer),
            audience: client_id,
            clock_skew,
            require_exp: true,
        },
    )?;

    let now = epoch_seconds();
    let iat = claims
        .get("iat")
        .and_then(value_as_i64)
        .ok_or_else(|| token_validation("ID token has no iat claim"))?;
    if iat > now.saturating_add(clock_skew as i64) {
        return Err(token_validation(format!(
            "ID token issued in the future (iat {iat}, now {now})"
        )));
    }

    let azp = claims.get("azp").and_then(Value::as_str);
    if let Some(Value::Array(audiences)) = claims.get("aud") {
        if audiences.len() > 1 && azp.is_none() {
            return Err(token_validation(
                "ID token has multiple audiences but no azp claim",
            ));
        }
    }
    if let Some(azp) = azp {
        if azp != client_id {
            return Err(token_validation(format!(
                "ID token azp '{azp}' does not match client_id"
            )));
        }
    }

    if let Some(expected) = nonce {
        match claims.get("nonce").and_then(Value::as_str) {
            Some(actual) if actual == expected => {}
            Some(_) => return Err(token_validation("ID token nonce mismatch")),
            None => return Err(token_validation("ID token is missing the expected nonce")),
        }
    }

    Ok(claims)
}

fn map_decode_error(token: &str, err: jsonwebtoken::errors::Error) -> OidcError {
    match err.kind() {
        ErrorKind::ExpiredSignature => {
            let expired_at = jwt_claims(token)
                .and_then(|claims| claims.get("exp").and_then(value_as_i64))
                .unwrap_or_default();
            OidcError::ExpiredToken {
                expired_at,
                now: epoch_seconds(),
            }
        }
        ErrorKind::InvalidIssuer => token_validation("Invalid issuer in token"),
        ErrorKind::InvalidAudience => token_validation("Invalid audience in token"),
        ErrorKind::ImmatureSignature => token_validation("Token is not valid yet (nbf)"),
        ErrorKind::InvalidSignature => token_validation("Invalid token signature"),
        _ => err.into(),
    }
}

fn key_type_for(alg: Algorithm) -> OidcResult<&'static str> {
    match alg {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => Ok("RSA"),
        Algorithm::ES256 | Algorithm::ES384 => Ok("EC"),
        other => Err(token_validation(format!(
            "Unsupported signing algorithm {other:?}"
        ))),
    }
}

/// Picks the key named by `kid`, or the only signing key of the right type
/// when the header has no `kid`.
fn select_key(alg: Algorithm, kid: Option<&str>, keys: &[SigningKey]) -> OidcResult<DecodingKey> {
    let kty = key_type_for(alg)?;
    let candidates: Vec<JwkEntry> = keys
        .iter()
        .filter_map(|key| serde_json::from_value::<JwkEntry>(key.clone()).ok())
        .filter(|jwk| jwk.kty == kty)
        .filter(|jwk| jwk.key_use.as_deref().map_or(true, |key_use| key_use == "sig"))
        .collect();

    let jwk = match kid {
        Some(kid) => candidates
            .iter()
            .find(|jwk| jwk.kid.as_deref() == Some(kid))
            .ok_or_else(|| token_validation(format!("No signing key found for kid {kid}")))?,
        None => match candidates.as_slice() {
            [only] => only,
            [] => return Err(token_validation("No signing key available")),
            _ => {
                return Err(token_validation(
                    "Token has no kid and more than one signing key matches",
                ))
            }
        },
    };

    match jwk.kty.as_str() {
        "RSA" => {
            let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                return Err(token_validation("RSA signing key is missing n or e"));
            };
            Ok(DecodingKey::from_rsa_components(n, e)?)
        }
        _ => {
            let (Some(x), Some(y)) = (jwk.x.as_deref(), jwk.y.as_deref()) else {
                return Err(token_validation("EC signing key is missing x or y"));
            };
            Ok(DecodingKey::from_ec_components(x, y)?)
        }
    }
}
