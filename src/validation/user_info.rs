use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{token_validation, OidcResult};
use crate::logger::Logger;
use crate::metadata::{JsonService, MetadataService, ResponseBody};
use crate::validation::id_token::{verify_jwt, JwtExpectations};

/// Fetches claims from the provider's UserInfo endpoint.
pub struct UserInfoService {
    json: JsonService,
    metadata: Arc<MetadataService>,
    client_id: String,
    jwt_issuer: String,
    clock_skew: u64,
    logger: Logger,
}

impl UserInfoService {
    pub fn new(
        json: JsonService,
        metadata: Arc<MetadataService>,
        client_id: impl Into<String>,
        jwt_issuer: impl Into<String>,
        clock_skew: u64,
    ) -> Self {
        Self {
            json,
            metadata,
            client_id: client_id.into(),
            jwt_issuer: jwt_issuer.into(),
            clock_skew,
            logger: Logger::new("UserInfoService"),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// GETs the UserInfo endpoint with `access_token` as bearer. Signed
    /// (`application/jwt`) responses are verified against the provider keys.
    pub async fn get_claims(&self, access_token: &str) -> OidcResult<Map<String, Value>> {
        let url = self.metadata.get_user_info_endpoint().await?;
        self.logger.debug(format!("get_claims: requesting {url}"));

        match self.json.get(&url, Some(access_token)).await? {
            ResponseBody::Json(Value::Object(claims)) => Ok(claims),
            ResponseBody::Json(_) => Err(token_validation("UserInfo response is not a JSON object")),
            ResponseBody::Jwt(token) => self.claims_from_jwt(&token).await,
        }
    }

    async fn claims_from_jwt(&self, token: &str) -> OidcResult<Map<String, Value>> {
        let keys = self.metadata.get_signing_keys().await?;
        let issuer = match self.jwt_issuer.as_str() {
            "ANY" => None,
            "OP" => Some(self.metadata.get_issuer().await?),
            other => Some(other.to_string()),
        };

        verify_jwt(
            token,
            &keys,
            JwtExpectations {
                issuer: issuer.as_deref(),
                audience: &self.client_id,
                clock_skew: self.clock_skew,
                require_exp: false,
            },
        )
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::metadata::OidcMetadata;
    use crate::oidc_client::OidcClientSettings;
    use crate::test_support::keys::{sign_test_token, test_jwk};
    use crate::test_support::start_mock_server;
    use httpmock::prelude::*;
    use serde_json::json;

    fn service(server: &httpmock::MockServer) -> UserInfoService {
        let metadata = OidcMetadata {
            issuer: Some("https://op".into()),
            userinfo_endpoint: Some(server.url("/userinfo")),
            ..Default::default()
        };
        let settings = OidcClientSettings::new("https://op", "spa", "https://app/cb")
            .with_metadata(metadata)
            .with_signing_keys(vec![test_jwk()]);
        let json = JsonService::new().unwrap();
        let metadata = Arc::new(MetadataService::new(&settings, json.clone()));
        UserInfoService::new(json, metadata, "spa", "OP", 300)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn json_claims_are_returned() {
        let server = start_mock_server();
        server.mock(|when, then| {
            when.method(GET)
                .path("/userinfo")
                .header("authorization", "Bearer at");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"sub": "alice", "email": "alice@example.com"}));
        });

        let claims = service(&server).get_claims("at").await.unwrap();
        assert_eq!(claims["email"], "alice@example.com");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn signed_claims_are_verified() {
        let server = start_mock_server();
        let token = sign_test_token(&json!({"iss": "https://op", "aud": "spa", "sub": "alice"}));
        server.mock(|when, then| {
            when.method(GET).path("/userinfo");
            then.status(200)
                .header("content-type", "application/jwt")
                .body(token.clone());
        });

        let claims = service(&server).get_claims("at").await.unwrap();
        assert_eq!(claims["sub"], "alice");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn signed_claims_from_other_issuer_fail() {
        let server = start_mock_server();
        let token = sign_test_token(&json!({"iss": "https://evil", "aud": "spa", "sub": "alice"}));
        server.mock(|when, then| {
            when.method(GET).path("/userinfo");
            then.status(200)
                .header("content-type", "application/jwt")
                .body(token.clone());
        });

        assert!(service(&server).get_claims("at").await.is_err());
    }
}
