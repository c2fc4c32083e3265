use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{configuration_error, OidcResult};
use crate::logger::Logger;
use crate::metadata::{JsonService, MetadataService};

/// Successful token-endpoint response (RFC 6749 §5.1).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExchangeCodeArgs {
    pub code: String,
    pub code_verifier: Option<String>,
    pub redirect_uri: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub extra_token_params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct RefreshTokenArgs {
    pub refresh_token: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
    pub extra_token_params: BTreeMap<String, String>,
}

/// Client for the token endpoint; credentials go in the form body
/// (`client_secret_post`).
pub struct TokenClient {
    json: JsonService,
    metadata: Arc<MetadataService>,
    logger: Logger,
}

impl TokenClient {
    pub fn new(json: JsonService, metadata: Arc<MetadataService>) -> Self {
        Self {
            json,
            metadata,
            logger: Logger::new("TokenClient"),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub async fn exchange_code(&self, args: ExchangeCodeArgs) -> OidcResult<TokenResponse> {
        let mut params = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), args.code),
            ("redirect_uri".to_string(), args.redirect_uri),
            ("client_id".to_string(), args.client_id),
        ];
        if let Some(verifier) = args.code_verifier {
            params.push(("code_verifier".to_string(), verifier));
        }
        if let Some(secret) = args.client_secret {
            params.push(("client_secret".to_string(), secret));
        }
        params.extend(args.extra_token_params);

        self.logger.debug("exchange_code: posting authorization code");
        self.post(params).await
    }

    pub async fn exchange_refresh_token(&self, args: RefreshTokenArgs) -> OidcResult<TokenResponse> {
        let mut params = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), args.refresh_token),
            ("client_id".to_string(), args.client_id),
        ];
        if let Some(secret) = args.client_secret {
            params.push(("client_secret".to_string(), secret));
        }
        if let Some(scope) = args.scope {
            params.push(("scope".to_string(), scope));
        }
        params.extend(args.extra_token_params);

        self.logger.debug("exchange_refresh_token: posting refresh token");
        self.post(params).await
    }

    async fn post(&self, params: Vec<(String, String)>) -> OidcResult<TokenResponse> {
        let url = self
            .metadata
            .get_token_endpoint()
            .await?
            .ok_or_else(|| configuration_error("Metadata does not contain token_endpoint"))?;
        let body = self.json.post_form(&url, &params).await?;
        Ok(serde_json::from_value(body)?)
    }
}
