//! Provider discovery: the OpenID configuration document and its JWKS.

mod json;
mod service;
mod types;

pub use json::{JsonService, ResponseBody};
pub use service::MetadataService;
pub use types::{OidcMetadata, SigningKey};
