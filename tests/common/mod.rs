#![allow(dead_code)]

#[path = "../../src/test_support/keys.rs"]
pub mod keys;

use httpmock::prelude::*;
use httpmock::{Mock, MockServer};
use serde_json::{json, Value};

pub const CLIENT_ID: &str = "spa";
pub const REDIRECT_URI: &str = "https://app.example/callback";

pub fn discovery_document(server: &MockServer) -> Value {
    json!({
        "issuer": server.base_url(),
        "authorization_endpoint": server.url("/authorize"),
        "token_endpoint": server.url("/token"),
        "userinfo_endpoint": server.url("/userinfo"),
        "jwks_uri": server.url("/jwks"),
        "end_session_endpoint": server.url("/logout"),
        "response_types_supported": ["code", "id_token", "id_token token"]
    })
}

pub fn mock_discovery(server: &MockServer) -> Mock<'_> {
    let document = discovery_document(server);
    server.mock(|when, then| {
        when.method(GET).path("/.well-known/openid-configuration");
        then.status(200).json_body(document);
    })
}

pub fn mock_jwks(server: &MockServer) -> Mock<'_> {
    server.mock(|when, then| {
        when.method(GET).path("/jwks");
        then.status(200).json_body(json!({"keys": [keys::test_jwk()]}));
    })
}
