use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{configuration_error, OidcError, OidcResult};
use crate::metadata::{OidcMetadata, SigningKey};
use crate::platform::environment::settings_json_from_env;

pub const DEFAULT_RESPONSE_TYPE: &str = "id_token";
pub const DEFAULT_SCOPE: &str = "openid";
pub const DEFAULT_STALE_STATE_AGE_SECS: u64 = 900;
pub const DEFAULT_CLOCK_SKEW_SECS: u64 = 300;
pub const WELL_KNOWN_PATH: &str = ".well-known/openid-configuration";

/// Where the provider puts the response parameters on the callback URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Query,
    Fragment,
}

impl ResponseMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseMode::Query => "query",
            ResponseMode::Fragment => "fragment",
        }
    }

    /// `query` for the code flow, `fragment` for everything else.
    pub fn default_for(response_type: &str) -> Self {
        if is_code_flow(response_type) {
            ResponseMode::Query
        } else {
            ResponseMode::Fragment
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseMode {
    type Err = OidcError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "query" => Ok(ResponseMode::Query),
            "fragment" => Ok(ResponseMode::Fragment),
            other => Err(configuration_error(format!(
                "unsupported response_mode '{other}'"
            ))),
        }
    }
}

/// `true` when `response_type` requests an ID token.
pub fn is_oidc(response_type: &str) -> bool {
    response_type.split_whitespace().any(|part| part == "id_token")
}

/// `true` for the authorization code flow (`response_type=code`).
pub fn is_code_flow(response_type: &str) -> bool {
    response_type.split_whitespace().any(|part| part == "code")
}

/// `true` when `response_type` requests an access token directly.
pub fn is_oauth(response_type: &str) -> bool {
    response_type.split_whitespace().any(|part| part == "token")
}

/// Settings for [`crate::oidc_client::OidcClient`].
///
/// Durations are whole seconds so the struct can be loaded from JSON or the
/// environment. Unset fields take the defaults listed on each field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcClientSettings {
    pub authority: String,
    /// Defaults to `{authority}/.well-known/openid-configuration`.
    pub metadata_url: Option<String>,
    /// Complete discovery document; skips the metadata fetch.
    pub metadata: Option<OidcMetadata>,
    /// Properties overlaid onto the fetched discovery document.
    pub metadata_seed: Option<Map<String, Value>>,
    /// Static JWKS keys; skips the `jwks_uri` fetch.
    pub signing_keys: Option<Vec<SigningKey>>,
    pub client_id: String,
    pub client_secret: Option<String>,
    /// Default `id_token`.
    pub response_type: String,
    /// Default `openid`.
    pub scope: String,
    pub redirect_uri: String,
    pub post_logout_redirect_uri: Option<String>,
    pub popup_post_logout_redirect_uri: Option<String>,
    pub prompt: Option<String>,
    pub display: Option<String>,
    pub max_age: Option<u64>,
    pub ui_locales: Option<String>,
    pub acr_values: Option<String>,
    pub resource: Option<String>,
    pub response_mode: Option<ResponseMode>,
    pub filter_protocol_claims: bool,
    pub load_user_info: bool,
    pub stale_state_age: u64,
    pub clock_skew: u64,
    /// Accepted `iss` of a JWT UserInfo response: `OP` (the provider issuer,
    /// default), `ANY`, or an exact issuer.
    pub user_info_jwt_issuer: String,
    /// Combine differing ID token and UserInfo claim values into arrays
    /// instead of letting UserInfo overwrite.
    pub merge_claims: bool,
    pub extra_query_params: BTreeMap<String, String>,
    pub extra_token_params: BTreeMap<String, String>,
}

impl Default for OidcClientSettings {
    fn default() -> Self {
        Self {
            authority: String::new(),
            metadata_url: None,
            metadata: None,
            metadata_seed: None,
            signing_keys: None,
            client_id: String::new(),
            client_secret: None,
            response_type: DEFAULT_RESPONSE_TYPE.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            redirect_uri: String::new(),
            post_logout_redirect_uri: None,
            popup_post_logout_redirect_uri: None,
            prompt: None,
            display: None,
            max_age: None,
            ui_locales: None,
            acr_values: None,
            resource: None,
            response_mode: None,
            filter_protocol_claims: true,
            load_user_info: true,
            stale_state_age: DEFAULT_STALE_STATE_AGE_SECS,
            clock_skew: DEFAULT_CLOCK_SKEW_SECS,
            user_info_jwt_issuer: "OP".to_string(),
            merge_claims: true,
            extra_query_params: BTreeMap::new(),
            extra_token_params: BTreeMap::new(),
        }
    }
}

impl OidcClientSettings {
    pub fn new(
        authority: impl Into<String>,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            authority: authority.into(),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            ..Default::default()
        }
    }

    /// Loads settings from `OIDC_CONFIG` and the `OIDC_*` variables.
    pub fn from_env() -> OidcResult<Self> {
        let json = settings_json_from_env();
        Ok(serde_json::from_value(Value::Object(json))?)
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_response_type(mut self, response_type: impl Into<String>) -> Self {
        self.response_type = response_type.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_metadata_url(mut self, url: impl Into<String>) -> Self {
        self.metadata_url = Some(url.into());
        self
    }

    pub fn with_metadata(mut self, metadata: OidcMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_metadata_seed(mut self, seed: Map<String, Value>) -> Self {
        self.metadata_seed = Some(seed);
        self
    }

    pub fn with_signing_keys(mut self, keys: Vec<SigningKey>) -> Self {
        self.signing_keys = Some(keys);
        self
    }

    pub fn with_post_logout_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.post_logout_redirect_uri = Some(uri.into());
        self
    }

    pub fn with_response_mode(mut self, mode: ResponseMode) -> Self {
        self.response_mode = Some(mode);
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_load_user_info(mut self, load: bool) -> Self {
        self.load_user_info = load;
        self
    }

    pub fn with_filter_protocol_claims(mut self, filter: bool) -> Self {
        self.filter_protocol_claims = filter;
        self
    }

    pub fn with_stale_state_age(mut self, age: Duration) -> Self {
        self.stale_state_age = age.as_secs();
        self
    }

    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew.as_secs();
        self
    }

    pub fn with_extra_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_query_params.insert(key.into(), value.into());
        self
    }

    pub fn with_extra_token_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_token_params.insert(key.into(), value.into());
        self
    }

    /// Discovery document URL, derived from `authority` unless set explicitly.
    pub fn resolved_metadata_url(&self) -> OidcResult<String> {
        if let Some(url) = self.metadata_url.as_deref().filter(|url| !url.is_empty()) {
            return Ok(url.to_string());
        }
        if self.authority.is_empty() {
            return Err(configuration_error("authority or metadata_url is required"));
        }
        let authority = self.authority.trim_end_matches('/');
        Ok(format!("{authority}/{WELL_KNOWN_PATH}"))
    }

    pub fn resolved_response_mode(&self) -> ResponseMode {
        self.response_mode
            .unwrap_or_else(|| ResponseMode::default_for(&self.response_type))
    }

    pub fn stale_state_age(&self) -> Duration {
        Duration::from_secs(self.stale_state_age)
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew)
    }

    /// Fails when neither `authority` nor any metadata source is configured,
    /// or `client_id` is empty.
    pub fn validate(&self) -> OidcResult<()> {
        if self.authority.is_empty() && self.metadata_url.is_none() && self.metadata.is_none() {
            return Err(configuration_error("authority or metadata is required"));
        }
        if self.client_id.is_empty() {
            return Err(configuration_error("client_id is required"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_applied_when_deserializing() {
        let settings: OidcClientSettings = serde_json::from_value(json!({
            "authority": "https://op/",
            "client_id": "spa"
        }))
        .unwrap();

        assert_eq!(settings.response_type, "id_token");
        assert_eq!(settings.scope, "openid");
        assert!(settings.filter_protocol_claims);
        assert!(settings.load_user_info);
        assert_eq!(settings.stale_state_age(), Duration::from_secs(900));
        assert_eq!(settings.clock_skew(), Duration::from_secs(300));
        assert_eq!(
            settings.resolved_metadata_url().unwrap(),
            "https://op/.well-known/openid-configuration"
        );
    }

    #[test]
    fn response_mode_follows_flow() {
        let implicit = OidcClientSettings::new("https://op", "spa", "https://app/cb")
            .with_response_type("id_token token");
        assert_eq!(implicit.resolved_response_mode(), ResponseMode::Fragment);

        let code = implicit.clone().with_response_type("code");
        assert_eq!(code.resolved_response_mode(), ResponseMode::Query);

        let forced = code.with_response_mode(ResponseMode::Fragment);
        assert_eq!(forced.resolved_response_mode(), ResponseMode::Fragment);
    }

    #[test]
    fn validate_requires_client_id() {
        let settings = OidcClientSettings::new("https://op", "", "https://app/cb");
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, OidcError::Configuration { .. }));
    }

    #[test]
    fn response_type_helpers() {
        assert!(is_oidc("id_token token"));
        assert!(is_oauth("id_token token"));
        assert!(!is_oauth("code"));
        assert!(is_code_flow("code"));
        assert!("QUERY".parse::<ResponseMode>().is_ok());
        assert!("form_post".parse::<ResponseMode>().is_err());
    }
}
