pub mod base64;
pub mod jwt;
pub mod random;
pub mod time;
pub mod url_params;

pub use base64::{
    base64_url_decode, base64_url_decode_bytes, base64_url_encode, base64_url_encode_bytes,
    DecodeBase64Error,
};
pub use jwt::{decode_jwt, jwt_claims, value_as_i64, DecodedToken};
pub use random::{random_id, random_url_safe};
pub use time::{epoch_seconds, expires_at_from_now, seconds_until};
pub use url_params::{parse_url_params, ParamsLocation};
