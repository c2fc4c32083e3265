use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{configuration_error, invalid_state, OidcError, OidcResult};
use crate::logger::Logger;
use crate::metadata::{JsonService, MetadataService};
use crate::oidc_client::pkce::PkcePair;
use crate::oidc_client::request::{SigninArgs, SigninRequest, SignoutArgs, SignoutRequest};
use crate::oidc_client::response::{SigninResponse, SignoutResponse};
use crate::oidc_client::settings::{is_code_flow, is_oidc, OidcClientSettings, ResponseMode};
use crate::oidc_client::state::{self, SigninState, SignoutState};
use crate::store::{StateStore, WebStorageStateStore};
use crate::util::random_id;
use crate::validation::{apply_token_response, RefreshTokenArgs, ResponseValidator};

/// Protocol engine for one relying party: builds authorization and
/// end-session requests, correlates callbacks with stored state and
/// validates the responses.
pub struct OidcClient {
    settings: Arc<OidcClientSettings>,
    metadata: Arc<MetadataService>,
    validator: ResponseValidator,
    state_store: Arc<dyn StateStore>,
    json: JsonService,
    logger: Logger,
}

impl std::fmt::Debug for OidcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcClient")
            .field("authority", &self.settings.authority)
            .field("client_id", &self.settings.client_id)
            .finish()
    }
}

pub struct OidcClientBuilder {
    settings: OidcClientSettings,
    state_store: Option<Arc<dyn StateStore>>,
    logger: Option<Logger>,
    http: Option<reqwest::Client>,
}

impl OidcClientBuilder {
    fn new(settings: OidcClientSettings) -> Self {
        Self {
            settings,
            state_store: None,
            logger: None,
            http: None,
        }
    }

    /// Overrides the store for pending request state. Defaults to an
    /// in-memory [`WebStorageStateStore`].
    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Uses a preconfigured HTTP client (proxies, TLS roots, timeouts).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> OidcResult<OidcClient> {
        self.settings.validate()?;
        let logger = self.logger.unwrap_or_else(|| Logger::new("OidcClient"));
        let json = match self.http {
            Some(http) => JsonService::with_client(http),
            None => JsonService::new()?,
        }
        .with_logger(logger.child("JsonService"));

        let settings = Arc::new(self.settings);
        let metadata = Arc::new(
            MetadataService::new(&settings, json.clone()).with_logger(logger.child("MetadataService")),
        );
        let validator = ResponseValidator::new(settings.clone(), metadata.clone(), json.clone())
            .with_logger(logger.child("ResponseValidator"));
        let state_store = self
            .state_store
            .unwrap_or_else(|| Arc::new(WebStorageStateStore::default()));

        Ok(OidcClient {
            settings,
            metadata,
            validator,
            state_store,
            json,
            logger,
        })
    }
}

impl OidcClient {
    pub fn new(settings: OidcClientSettings) -> OidcResult<Self> {
        Self::builder(settings).build()
    }

    pub fn builder(settings: OidcClientSettings) -> OidcClientBuilder {
        OidcClientBuilder::new(settings)
    }

    pub fn settings(&self) -> &OidcClientSettings {
        &self.settings
    }

    pub fn metadata_service(&self) -> &Arc<MetadataService> {
        &self.metadata
    }

    pub fn state_store(&self) -> &Arc<dyn StateStore> {
        &self.state_store
    }

    pub(crate) fn json_service(&self) -> &JsonService {
        &self.json
    }

    /// Builds an authorization request and persists its state before
    /// returning it.
    pub async fn create_signin_request(&self, args: SigninArgs) -> OidcResult<SigninRequest> {
        let settings = &self.settings;
        let response_type = args
            .response_type
            .unwrap_or_else(|| settings.response_type.clone());
        let scope = args.scope.unwrap_or_else(|| settings.scope.clone());
        let redirect_uri = args
            .redirect_uri
            .unwrap_or_else(|| settings.redirect_uri.clone());

        if redirect_uri.is_empty() {
            return Err(configuration_error("redirect_uri is required"));
        }
        if response_type.trim().is_empty() {
            return Err(configuration_error("response_type is required"));
        }
        if scope.trim().is_empty() {
            return Err(configuration_error("scope is required"));
        }

        let authorization_endpoint = self.metadata.get_authorization_endpoint().await?;

        let mut state = SigninState::new(
            settings.authority.clone(),
            settings.client_id.clone(),
            redirect_uri,
            response_type.clone(),
            scope.clone(),
        );
        state.data = args.data;
        state.request_type = args.request_type;
        state.client_secret = settings.client_secret.clone();
        state.skip_user_info = args.skip_user_info;
        state.extra_token_params = merged(&settings.extra_token_params, args.extra_token_params);

        let code_flow = is_code_flow(&response_type);
        let wants_openid = scope.split_whitespace().any(|scope| scope == "openid");
        if is_oidc(&response_type) || (code_flow && wants_openid) {
            state.nonce = Some(random_id());
        }
        let pkce = code_flow.then(PkcePair::generate);
        let code_challenge = pkce.as_ref().map(|pair| pair.code_challenge().to_string());
        state.code_verifier = pkce.map(PkcePair::into_verifier);

        let explicit_mode = args.response_mode.or(settings.response_mode);
        state.response_mode =
            Some(explicit_mode.unwrap_or_else(|| ResponseMode::default_for(&response_type)));

        let mut optional: Vec<(String, String)> = Vec::new();
        let mut push = |key: &str, value: Option<String>| {
            if let Some(value) = value.filter(|value| !value.is_empty()) {
                optional.push((key.to_string(), value));
            }
        };
        push("prompt", args.prompt.or_else(|| settings.prompt.clone()));
        push("display", args.display.or_else(|| settings.display.clone()));
        push(
            "max_age",
            args.max_age.or(settings.max_age).map(|age| age.to_string()),
        );
        push("ui_locales", args.ui_locales.or_else(|| settings.ui_locales.clone()));
        push("id_token_hint", args.id_token_hint);
        push("login_hint", args.login_hint);
        push("acr_values", args.acr_values.or_else(|| settings.acr_values.clone()));
        push("resource", args.resource.or_else(|| settings.resource.clone()));
        push("request", args.request);
        push("request_uri", args.request_uri);
        push("response_mode", explicit_mode.map(|mode| mode.as_str().to_string()));
        optional.extend(merged(&settings.extra_query_params, args.extra_query_params));

        let request = SigninRequest::new(
            &authorization_endpoint,
            state,
            code_challenge.as_deref(),
            &optional,
        )?;

        self.state_store
            .set(&request.state.id, request.state.to_storage_string()?)
            .await?;
        self.logger
            .debug(format!("create_signin_request: state {} stored", request.state.id));
        Ok(request)
    }

    /// Finds the stored state for a callback URL. With `remove` the entry is
    /// consumed; a second lookup for the same state then fails.
    pub async fn read_signin_response_state(
        &self,
        url: &str,
        remove: bool,
    ) -> OidcResult<(SigninState, SigninResponse)> {
        let response = self.parse_signin_response(url);
        let Some(state_id) = response.state.clone() else {
            if let Some(error) = response.error_response() {
                return Err(OidcError::Protocol(error));
            }
            return Err(invalid_state("No state in response"));
        };

        let stored = if remove {
            self.state_store.remove(&state_id).await?
        } else {
            self.state_store.get(&state_id).await?
        };
        let stored =
            stored.ok_or_else(|| invalid_state("No matching state found in storage"))?;
        let state = SigninState::from_storage_string(&stored)
            .map_err(|err| invalid_state(format!("Stored state could not be read: {err}")))?;
        Ok((state, response))
    }

    pub async fn process_signin_response(&self, url: &str) -> OidcResult<SigninResponse> {
        let (state, response) = self.read_signin_response_state(url, true).await?;
        self.logger
            .debug(format!("process_signin_response: state {} consumed", state.id));
        self.validator.validate_signin_response(&state, response).await
    }

    /// Runs the refresh-token grant and validates the result.
    pub async fn use_refresh_token(
        &self,
        refresh_token: &str,
        scope: Option<&str>,
        expected_sub: Option<&str>,
    ) -> OidcResult<SigninResponse> {
        let tokens = self
            .validator
            .token_client()
            .exchange_refresh_token(RefreshTokenArgs {
                refresh_token: refresh_token.to_string(),
                client_id: self.settings.client_id.clone(),
                client_secret: self.settings.client_secret.clone(),
                scope: scope.map(str::to_string),
                extra_token_params: self.settings.extra_token_params.clone(),
            })
            .await?;

        let mut response = SigninResponse::default();
        apply_token_response(&mut response, tokens);
        if response.scope.is_none() {
            response.scope = scope.map(str::to_string);
        }
        if response.refresh_token.is_none() {
            response.refresh_token = Some(refresh_token.to_string());
        }
        self.validator
            .validate_refresh_response(response, expected_sub)
            .await
    }

    /// Builds an end-session request. A state entry is stored only when the
    /// provider will redirect back to a post-logout URI.
    pub async fn create_signout_request(&self, args: SignoutArgs) -> OidcResult<SignoutRequest> {
        let end_session_endpoint = self
            .metadata
            .get_end_session_endpoint()
            .await?
            .ok_or_else(|| configuration_error("Metadata does not contain end_session_endpoint"))?;

        let post_logout_redirect_uri = args
            .post_logout_redirect_uri
            .or_else(|| self.settings.post_logout_redirect_uri.clone());
        let state = post_logout_redirect_uri
            .as_ref()
            .map(|_| SignoutState::new(args.data, args.request_type));

        let request = SignoutRequest::new(
            &end_session_endpoint,
            args.id_token_hint.as_deref(),
            post_logout_redirect_uri.as_deref(),
            state,
            &merged(&self.settings.extra_query_params, args.extra_query_params),
        )?;

        if let Some(state) = &request.state {
            self.state_store
                .set(&state.id, state.to_storage_string()?)
                .await?;
            self.logger
                .debug(format!("create_signout_request: state {} stored", state.id));
        }
        Ok(request)
    }

    pub async fn read_signout_response_state(
        &self,
        url: &str,
        remove: bool,
    ) -> OidcResult<(Option<SignoutState>, SignoutResponse)> {
        let response = SignoutResponse::from_url(url);
        let Some(state_id) = response.state.clone() else {
            if let Some(error) = response.error_response() {
                return Err(OidcError::Protocol(error));
            }
            return Ok((None, response));
        };

        let stored = if remove {
            self.state_store.remove(&state_id).await?
        } else {
            self.state_store.get(&state_id).await?
        };
        let stored =
            stored.ok_or_else(|| invalid_state("No matching state found in storage"))?;
        let state = SignoutState::from_storage_string(&stored)
            .map_err(|err| invalid_state(format!("Stored state could not be read: {err}")))?;
        Ok((Some(state), response))
    }

    pub async fn process_signout_response(&self, url: &str) -> OidcResult<SignoutResponse> {
        match self.read_signout_response_state(url, true).await? {
            (Some(state), response) => self.validator.validate_signout_response(&state, response),
            (None, response) => Ok(response),
        }
    }

    /// Purges state entries older than `stale_state_age`. Returns how many
    /// were removed.
    pub async fn clear_stale_state(&self) -> OidcResult<usize> {
        state::clear_stale_state(
            self.state_store.as_ref(),
            self.settings.stale_state_age(),
            &self.logger,
        )
        .await
    }

    /// Reads the response from the configured location, falling back to the
    /// other one when it carries neither `state` nor `error`.
    fn parse_signin_response(&self, url: &str) -> SigninResponse {
        let preferred = self.settings.resolved_response_mode();
        let response = SigninResponse::from_url(url, preferred);
        if response.state.is_some() || response.error.is_some() {
            return response;
        }
        let fallback = match preferred {
            ResponseMode::Query => ResponseMode::Fragment,
            ResponseMode::Fragment => ResponseMode::Query,
        };
        SigninResponse::from_url(url, fallback)
    }
}

fn merged(
    base: &BTreeMap<String, String>,
    overrides: BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut result = base.clone();
    result.extend(overrides);
    result
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::metadata::OidcMetadata;
    use crate::util::{parse_url_params, ParamsLocation};
    use serde_json::json;

    fn settings() -> OidcClientSettings {
        let metadata = OidcMetadata {
            issuer: Some("https://op".into()),
            authorization_endpoint: Some("https://op/authorize".into()),
            end_session_endpoint: Some("https://op/logout".into()),
            ..Default::default()
        };
        OidcClientSettings::new("https://op", "spa", "https://app/cb")
            .with_metadata(metadata)
            .with_extra_query_param("audience", "api")
    }

    fn client_with_store() -> (OidcClient, Arc<WebStorageStateStore>) {
        let store = Arc::new(WebStorageStateStore::default());
        let client = OidcClient::builder(settings())
            .with_state_store(store.clone())
            .build()
            .unwrap();
        (client, store)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn signin_request_is_persisted_before_return() {
        let (client, store) = client_with_store();
        let request = client
            .create_signin_request(SigninArgs::default().with_data(json!({"n": 1})))
            .await
            .unwrap();

        let params = parse_url_params(&request.url, ParamsLocation::Query);
        assert_eq!(params["state"], request.state.id);
        assert_eq!(params["response_type"], "id_token");
        assert_eq!(params["audience"], "api");
        assert!(params.contains_key("nonce"));
        assert!(!params.contains_key("code_challenge"));

        let stored = store.get(&request.state.id).await.unwrap().unwrap();
        let state = SigninState::from_storage_string(&stored).unwrap();
        assert_eq!(state.data, Some(json!({"n": 1})));
        assert_eq!(state.response_mode, Some(ResponseMode::Fragment));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn code_flow_request_carries_pkce_challenge() {
        let client = OidcClient::new(settings().with_response_type("code")).unwrap();
        let request = client.create_signin_request(SigninArgs::default()).await.unwrap();

        let params = parse_url_params(&request.url, ParamsLocation::Query);
        let verifier = request.state.code_verifier.clone().unwrap();
        assert_eq!(
            params["code_challenge"],
            PkcePair::from_verifier(verifier).code_challenge()
        );
        assert_eq!(params["code_challenge_method"], "S256");
        assert!(!params.contains_key("response_mode"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn missing_redirect_uri_is_configuration_error() {
        let client = OidcClient::new(OidcClientSettings {
            redirect_uri: String::new(),
            ..settings()
        })
        .unwrap();
        let err = client
            .create_signin_request(SigninArgs::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OidcError::Configuration { .. }));
    }

    #[test]
    fn missing_client_id_fails_to_build() {
        let err = OidcClient::new(OidcClientSettings {
            client_id: String::new(),
            ..settings()
        })
        .unwrap_err();
        assert!(matches!(err, OidcError::Configuration { .. }));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unknown_state_leaves_store_untouched() {
        let (client, store) = client_with_store();
        let request = client.create_signin_request(SigninArgs::default()).await.unwrap();

        let err = client
            .process_signin_response("https://app/cb#id_token=x&state=unknown")
            .await
            .unwrap_err();

        assert!(matches!(err, OidcError::InvalidState { .. }));
        assert_eq!(store.get_all_keys().await.unwrap(), vec![request.state.id]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn oversized_expires_in_is_ignored() {
        let (client, _store) = client_with_store();

        let err = client
            .process_signin_response("https://app/cb#state=nope&expires_in=9223372036854775807")
            .await
            .unwrap_err();

        assert!(matches!(err, OidcError::InvalidState { .. }));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn provider_error_consumes_state() {
        let (client, store) = client_with_store();
        let request = client
            .create_signin_request(SigninArgs::default().with_data(json!("return")))
            .await
            .unwrap();
        let url = format!(
            "https://app/cb#error=access_denied&state={}",
            request.state.id
        );

        let err = client.process_signin_response(&url).await.unwrap_err();
        let error = err.error_response().unwrap();
        assert_eq!(error.error, "access_denied");
        assert_eq!(error.state, Some(json!("return")));
        assert!(store.get_all_keys().await.unwrap().is_empty());

        let err = client.process_signin_response(&url).await.unwrap_err();
        assert!(matches!(err, OidcError::InvalidState { .. }));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn error_without_state_is_protocol_error() {
        let client = OidcClient::new(settings()).unwrap();
        let err = client
            .process_signin_response("https://app/cb#error=login_required")
            .await
            .unwrap_err();
        assert!(matches!(err, OidcError::Protocol(_)));

        let err = client
            .process_signin_response("https://app/cb#id_token=x")
            .await
            .unwrap_err();
        assert!(matches!(err, OidcError::InvalidState { .. }));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn signout_state_round_trip() {
        let (client, store) = client_with_store();

        let without = client
            .create_signout_request(SignoutArgs::default().with_id_token_hint("idt"))
            .await
            .unwrap();
        assert!(without.state.is_none());
        assert!(store.get_all_keys().await.unwrap().is_empty());

        let request = client
            .create_signout_request(
                SignoutArgs::default()
                    .with_post_logout_redirect_uri("https://app/out")
                    .with_data(json!({"bye": true})),
            )
            .await
            .unwrap();
        let state = request.state.clone().unwrap();
        let params = parse_url_params(&request.url, ParamsLocation::Query);
        assert_eq!(params["state"], state.id);
        assert_eq!(params["post_logout_redirect_uri"], "https://app/out");

        let response = client
            .process_signout_response(&format!("https://app/out?state={}", state.id))
            .await
            .unwrap();
        assert_eq!(response.user_state, Some(json!({"bye": true})));
        assert!(store.get_all_keys().await.unwrap().is_empty());

        let trivial = client.process_signout_response("https://app/out").await.unwrap();
        assert!(trivial.state.is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn clear_stale_state_uses_configured_age() {
        let (client, store) = client_with_store();
        let mut old = SigninState::new("https://op", "spa", "https://app/cb", "id_token", "openid");
        old.created -= 10_000;
        store.set(&old.id, old.to_storage_string().unwrap()).await.unwrap();
        client.create_signin_request(SigninArgs::default()).await.unwrap();

        assert_eq!(client.clear_stale_state().await.unwrap(), 1);
        assert_eq!(client.clear_stale_state().await.unwrap(), 0);
        assert_eq!(store.get_all_keys().await.unwrap().len(), 1);
    }
}
