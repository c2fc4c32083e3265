use std::sync::{Arc, Mutex};

use async_lock::OnceCell;
use serde_json::{Map, Value};

use crate::error::{configuration_error, OidcResult};
use crate::logger::Logger;
use crate::metadata::json::JsonService;
use crate::metadata::types::{JwksDocument, OidcMetadata, SigningKey};
use crate::oidc_client::OidcClientSettings;

/// Lazily fetches and caches the discovery document and JWKS of one provider.
///
/// Each resource sits behind its own once-cell, so concurrent first callers
/// share a single request. Nothing is refetched until [`MetadataService::reset`].
pub struct MetadataService {
    metadata_url: Option<String>,
    static_metadata: Option<OidcMetadata>,
    metadata_seed: Option<Map<String, Value>>,
    static_signing_keys: Option<Vec<SigningKey>>,
    json: JsonService,
    logger: Logger,
    metadata: Mutex<Arc<OnceCell<OidcMetadata>>>,
    signing_keys: Mutex<Arc<OnceCell<Vec<SigningKey>>>>,
}

impl std::fmt::Debug for MetadataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataService")
            .field("metadata_url", &self.metadata_url)
            .finish()
    }
}

impl MetadataService {
    pub fn new(settings: &OidcClientSettings, json: JsonService) -> Self {
        Self {
            metadata_url: settings.resolved_metadata_url().ok(),
            static_metadata: settings.metadata.clone(),
            metadata_seed: settings.metadata_seed.clone(),
            static_signing_keys: settings.signing_keys.clone(),
            json,
            logger: Logger::new("MetadataService"),
            metadata: Mutex::new(Arc::new(OnceCell::new())),
            signing_keys: Mutex::new(Arc::new(OnceCell::new())),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.json = self.json.with_logger(logger.child("JsonService"));
        self.logger = logger;
        self
    }

    pub fn metadata_url(&self) -> Option<&str> {
        self.metadata_url.as_deref()
    }

    /// Drops both cached resources; the next accessor call fetches again.
    pub fn reset(&self) {
        *self.metadata.lock().unwrap() = Arc::new(OnceCell::new());
        *self.signing_keys.lock().unwrap() = Arc::new(OnceCell::new());
        self.logger.debug("reset: cached metadata discarded");
    }

    pub async fn get_metadata(&self) -> OidcResult<OidcMetadata> {
        let cell = self.metadata.lock().unwrap().clone();
        let metadata = cell
            .get_or_try_init(|| async { self.load_metadata().await })
            .await?;
        Ok(metadata.clone())
    }

    async fn load_metadata(&self) -> OidcResult<OidcMetadata> {
        if let Some(metadata) = &self.static_metadata {
            self.logger.debug("get_metadata: using metadata from settings");
            return Ok(metadata.clone());
        }

        let url = self
            .metadata_url
            .as_deref()
            .ok_or_else(|| configuration_error("No authority or metadata_url configured"))?;
        self.logger.debug(format!("get_metadata: fetching {url}"));
        let body = self.json.get_json(url, None).await?;
        let fetched: OidcMetadata = serde_json::from_value(body)?;

        match &self.metadata_seed {
            Some(seed) => Ok(fetched.merge_seed(seed)?),
            None => Ok(fetched),
        }
    }

    pub async fn get_issuer(&self) -> OidcResult<String> {
        let metadata = self.get_metadata().await?;
        required(metadata.issuer, "issuer")
    }

    pub async fn get_authorization_endpoint(&self) -> OidcResult<String> {
        let metadata = self.get_metadata().await?;
        required(metadata.authorization_endpoint, "authorization_endpoint")
    }

    pub async fn get_user_info_endpoint(&self) -> OidcResult<String> {
        let metadata = self.get_metadata().await?;
        required(metadata.userinfo_endpoint, "userinfo_endpoint")
    }

    pub async fn get_token_endpoint(&self) -> OidcResult<Option<String>> {
        Ok(self.get_metadata().await?.token_endpoint)
    }

    pub async fn get_check_session_iframe(&self) -> OidcResult<Option<String>> {
        Ok(self.get_metadata().await?.check_session_iframe)
    }

    pub async fn get_end_session_endpoint(&self) -> OidcResult<Option<String>> {
        Ok(self.get_metadata().await?.end_session_endpoint)
    }

    pub async fn get_revocation_endpoint(&self) -> OidcResult<Option<String>> {
        Ok(self.get_metadata().await?.revocation_endpoint)
    }

    /// JWKS keys from settings, or fetched from the metadata `jwks_uri`.
    pub async fn get_signing_keys(&self) -> OidcResult<Vec<SigningKey>> {
        let cell = self.signing_keys.lock().unwrap().clone();
        let keys = cell
            .get_or_try_init(|| async { self.load_signing_keys().await })
            .await?;
        Ok(keys.clone())
    }

    async fn load_signing_keys(&self) -> OidcResult<Vec<SigningKey>> {
        if let Some(keys) = &self.static_signing_keys {
            return Ok(keys.clone());
        }

        let metadata = self.get_metadata().await?;
        let jwks_uri = required(metadata.jwks_uri, "jwks_uri")?;
        self.logger.debug(format!("get_signing_keys: fetching {jwks_uri}"));
        let body = self.json.get_json(&jwks_uri, None).await?;
        let document: JwksDocument = serde_json::from_value(body)?;
        self.logger
            .debug(format!("get_signing_keys: {} key(s) loaded", document.keys.len()));
        Ok(document.keys)
    }
}

fn required(value: Option<String>, name: &str) -> OidcResult<String> {
    value.ok_or_else(|| configuration_error(format!("Metadata does not contain {name}")))
}
