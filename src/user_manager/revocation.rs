use std::sync::Arc;

use crate::error::{configuration_error, OidcResult};
use crate::logger::Logger;
use crate::metadata::{JsonService, MetadataService};

pub const ACCESS_TOKEN_TYPE_HINT: &str = "access_token";

/// RFC 7009 token revocation.
pub struct TokenRevocationClient {
    json: JsonService,
    metadata: Arc<MetadataService>,
    client_id: String,
    client_secret: Option<String>,
    logger: Logger,
}

impl TokenRevocationClient {
    pub fn new(
        json: JsonService,
        metadata: Arc<MetadataService>,
        client_id: impl Into<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            json,
            metadata,
            client_id: client_id.into(),
            client_secret,
            logger: Logger::new("TokenRevocationClient"),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub async fn revoke(&self, token: &str, token_type_hint: &str) -> OidcResult<()> {
        let url = self
            .metadata
            .get_revocation_endpoint()
            .await?
            .ok_or_else(|| configuration_error("Metadata does not contain revocation_endpoint"))?;

        let mut params = vec![
            ("client_id".to_string(), self.client_id.clone()),
            ("token".to_string(), token.to_string()),
            ("token_type_hint".to_string(), token_type_hint.to_string()),
        ];
        if let Some(secret) = &self.client_secret {
            params.push(("client_secret".to_string(), secret.clone()));
        }

        self.logger
            .debug(format!("revoke: revoking {token_type_hint}"));
        self.json.post_form(&url, &params).await?;
        Ok(())
    }
}
