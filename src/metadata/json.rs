use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde_json::Value;

use crate::error::{network_error, ErrorResponse, OidcError, OidcResult};
use crate::logger::Logger;

/// Body of a successful GET: JSON, or a compact JWT when the server answers
/// with `application/jwt` (signed UserInfo responses).
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Jwt(String),
}

/// Thin JSON-over-HTTP wrapper used for discovery, JWKS, UserInfo, token and
/// revocation requests.
#[derive(Clone, Debug)]
pub struct JsonService {
    http: Client,
    logger: Logger,
}

impl JsonService {
    pub fn new() -> OidcResult<Self> {
        #[cfg(not(target_arch = "wasm32"))]
        let http = Client::builder()
            .user_agent(format!("oidc-client-rs/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| OidcError::Internal(format!("Failed to build HTTP client: {err}")))?;
        #[cfg(target_arch = "wasm32")]
        let http = Client::new();

        Ok(Self::with_client(http))
    }

    pub fn with_client(http: Client) -> Self {
        Self {
            http,
            logger: Logger::new("JsonService"),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// GETs `url` and parses a JSON object body. A JWT body is rejected.
    pub async fn get_json(&self, url: &str, bearer: Option<&str>) -> OidcResult<Value> {
        match self.get(url, bearer).await? {
            ResponseBody::Json(value) => Ok(value),
            ResponseBody::Jwt(_) => Err(network_error(format!(
                "Expected JSON from {url} but received a JWT"
            ))),
        }
    }

    pub async fn get(&self, url: &str, bearer: Option<&str>) -> OidcResult<ResponseBody> {
        self.logger.debug(format!("get: {url}"));
        let mut request = self
            .http
            .get(url)
            .header(ACCEPT, HeaderValue::from_static("application/json, application/jwt"));
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| network_error(format!("Request to {url} failed: {err}")))?;
        if !response.status().is_success() {
            return Err(self.request_failed(url, response).await);
        }

        let is_jwt = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with("application/jwt"))
            .unwrap_or(false);
        let text = response
            .text()
            .await
            .map_err(|err| network_error(format!("Failed to read response from {url}: {err}")))?;

        if is_jwt {
            return Ok(ResponseBody::Jwt(text.trim().to_string()));
        }
        Ok(ResponseBody::Json(serde_json::from_str(&text)?))
    }

    /// POSTs an `application/x-www-form-urlencoded` body. An empty success
    /// body yields `Value::Null`; an OAuth2 error body yields
    /// [`OidcError::Protocol`].
    pub async fn post_form(&self, url: &str, params: &[(String, String)]) -> OidcResult<Value> {
        self.logger.debug(format!("post_form: {url}"));
        let response = self
            .http
            .post(url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .form(params)
            .send()
            .await
            .map_err(|err| network_error(format!("Request to {url} failed: {err}")))?;
        if !response.status().is_success() {
            return Err(self.request_failed(url, response).await);
        }

        let text = response
            .text()
            .await
            .map_err(|err| network_error(format!("Failed to read response from {url}: {err}")))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn request_failed(&self, url: &str, response: Response) -> OidcError {
        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                return network_error(format!(
                    "Request to {url} failed with status {status} and unreadable body: {err}"
                ));
            }
        };

        if let Some(error) = parse_error_body(&body) {
            self.logger
                .error(format!("Request to {url} returned error {}", error.error));
            return OidcError::Protocol(error);
        }

        self.logger
            .error(format!("Request to {url} failed with status {status}"));
        network_error(format!(
            "Request to {url} failed with status {status}; body: {body}"
        ))
    }
}

fn parse_error_body(body: &str) -> Option<ErrorResponse> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?.as_str()?;
    let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
    Some(
        ErrorResponse::new(error)
            .with_description(text("error_description"))
            .with_uri(text("error_uri")),
    )
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::test_support::start_mock_server;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test(flavor = "current_thread")]
    async fn get_json_sends_bearer_token() {
        let server = start_mock_server();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/userinfo")
                .header("authorization", "Bearer at-1");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"sub": "alice"}));
        });

        let service = JsonService::new().unwrap();
        let body = service
            .get_json(&server.url("/userinfo"), Some("at-1"))
            .await
            .unwrap();

        mock.assert();
        assert_eq!(body["sub"], "alice");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn jwt_bodies_are_returned_verbatim() {
        let server = start_mock_server();
        server.mock(|when, then| {
            when.method(GET).path("/userinfo");
            then.status(200)
                .header("content-type", "application/jwt")
                .body("a.b.c\n");
        });

        let service = JsonService::new().unwrap();
        let body = service.get(&server.url("/userinfo"), None).await.unwrap();
        assert_eq!(body, ResponseBody::Jwt("a.b.c".into()));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn oauth_error_body_maps_to_protocol_error() {
        let server = start_mock_server();
        server.mock(|when, then| {
            when.method(POST)
                .path("/token")
                .body_contains("grant_type=authorization_code");
            then.status(400)
                .header("content-type", "application/json")
                .json_body(json!({"error": "invalid_grant", "error_description": "bad code"}));
        });

        let service = JsonService::new().unwrap();
        let params = vec![("grant_type".to_string(), "authorization_code".to_string())];
        let err = service
            .post_form(&server.url("/token"), &params)
            .await
            .unwrap_err();

        let response = err.error_response().unwrap();
        assert_eq!(response.error, "invalid_grant");
        assert_eq!(response.error_description.as_deref(), Some("bad code"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn server_errors_map_to_network_error() {
        let server = start_mock_server();
        server.mock(|when, then| {
            when.method(GET).path("/.well-known/openid-configuration");
            then.status(500).body("boom");
        });

        let service = JsonService::new().unwrap();
        let err = service
            .get_json(&server.url("/.well-known/openid-configuration"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OidcError::Network { .. }));
    }
}
