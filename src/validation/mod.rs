//! Response validation: state matching, code exchange, ID token verification
//! and profile claim processing.

mod claims;
mod id_token;
mod token_client;
mod user_info;
mod validator;

pub use claims::{filter_protocol_claims, merge_claims, PROTOCOL_CLAIMS};
pub use id_token::{validate_id_token, verify_jwt, JwtExpectations};
pub use token_client::{ExchangeCodeArgs, RefreshTokenArgs, TokenClient, TokenResponse};
pub use user_info::UserInfoService;
pub use validator::ResponseValidator;
pub(crate) use validator::apply_token_response;
