use std::sync::Arc;

use serde_json::Value;

use crate::error::{invalid_state, token_validation, OidcError, OidcResult};
use crate::logger::Logger;
use crate::metadata::{JsonService, MetadataService};
use crate::oidc_client::settings::{is_code_flow, is_oauth, is_oidc};
use crate::oidc_client::{
    OidcClientSettings, SigninResponse, SigninState, SignoutResponse, SignoutState,
};
use crate::validation::claims::{filter_protocol_claims, merge_claims};
use crate::validation::id_token::validate_id_token;
use crate::validation::token_client::{ExchangeCodeArgs, TokenClient, TokenResponse};
use crate::validation::user_info::UserInfoService;

/// Checks authorization and end-session responses against their stored state
/// and completes them (code exchange, ID token claims, UserInfo).
pub struct ResponseValidator {
    settings: Arc<OidcClientSettings>,
    metadata: Arc<MetadataService>,
    user_info: UserInfoService,
    token_client: TokenClient,
    logger: Logger,
}

impl ResponseValidator {
    pub fn new(
        settings: Arc<OidcClientSettings>,
        metadata: Arc<MetadataService>,
        json: JsonService,
    ) -> Self {
        let user_info = UserInfoService::new(
            json.clone(),
            metadata.clone(),
            settings.client_id.clone(),
            settings.user_info_jwt_issuer.clone(),
            settings.clock_skew,
        );
        let token_client = TokenClient::new(json, metadata.clone());
        Self {
            settings,
            metadata,
            user_info,
            token_client,
            logger: Logger::new("ResponseValidator"),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.user_info = self.user_info.with_logger(logger.child("UserInfoService"));
        self.token_client = self.token_client.with_logger(logger.child("TokenClient"));
        self.logger = logger;
        self
    }

    pub fn token_client(&self) -> &TokenClient {
        &self.token_client
    }

    pub async fn validate_signin_response(
        &self,
        state: &SigninState,
        mut response: SigninResponse,
    ) -> OidcResult<SigninResponse> {
        if response.state.as_deref() != Some(state.id.as_str()) {
            return Err(invalid_state("State does not match the response"));
        }
        response.user_state = state.data.clone();

        if let Some(error) = response.error_response() {
            self.logger
                .warn(format!("validate_signin_response: provider returned {}", error.error));
            return Err(OidcError::Protocol(error));
        }

        let code_flow = is_code_flow(&state.response_type);
        if code_flow {
            if response.id_token.is_some() || response.access_token.is_some() {
                return Err(token_validation(
                    "Code flow response must not carry tokens in the callback",
                ));
            }
            let code = response
                .code
                .clone()
                .ok_or_else(|| token_validation("No code in response"))?;
            let tokens = self
                .token_client
                .exchange_code(ExchangeCodeArgs {
                    code,
                    code_verifier: state.code_verifier.clone(),
                    redirect_uri: state.redirect_uri.clone(),
                    client_id: state.client_id.clone(),
                    client_secret: state.client_secret.clone(),
                    extra_token_params: state.extra_token_params.clone(),
                })
                .await?;
            apply_token_response(&mut response, tokens);
        } else if response.code.is_some() {
            return Err(token_validation("Unexpected code in response"));
        }

        if response.scope.is_none() {
            response.scope = Some(state.scope.clone());
        }

        let expects_id_token = is_oidc(&state.response_type)
            || (code_flow && state.scope.split_whitespace().any(|scope| scope == "openid"));
        match (&response.id_token, expects_id_token) {
            (None, true) => return Err(token_validation("No id_token in response")),
            (Some(_), false) => return Err(token_validation("Unexpected id_token in response")),
            _ => {}
        }
        if is_oauth(&state.response_type) && response.access_token.is_none() {
            return Err(token_validation("No access_token in response"));
        }

        if let Some(id_token) = response.id_token.clone() {
            response.profile = self.validate_token(&id_token, state.nonce.as_deref()).await?;
        }

        self.process_claims(&mut response, state.skip_user_info).await?;
        self.logger.debug("validate_signin_response: response is valid");
        Ok(response)
    }

    /// Validates the result of a refresh-token grant. A returned ID token
    /// must belong to `expected_sub`; without one the caller keeps its
    /// current profile.
    pub async fn validate_refresh_response(
        &self,
        mut response: SigninResponse,
        expected_sub: Option<&str>,
    ) -> OidcResult<SigninResponse> {
        if let Some(id_token) = response.id_token.clone() {
            let claims = self.validate_token(&id_token, None).await?;
            let sub = claims.get("sub").and_then(Value::as_str);
            if expected_sub.is_some() && sub != expected_sub {
                return Err(token_validation("Refreshed ID token belongs to a different subject"));
            }
            response.profile = claims;
            self.process_claims(&mut response, false).await?;
        }
        Ok(response)
    }

    pub fn validate_signout_response(
        &self,
        state: &SignoutState,
        mut response: SignoutResponse,
    ) -> OidcResult<SignoutResponse> {
        if response.state.as_deref() != Some(state.id.as_str()) {
            return Err(invalid_state("State does not match the response"));
        }
        response.user_state = state.data.clone();

        if let Some(error) = response.error_response() {
            self.logger
                .warn(format!("validate_signout_response: provider returned {}", error.error));
            return Err(OidcError::Protocol(error));
        }
        Ok(response)
    }

    async fn validate_token(
        &self,
        id_token: &str,
        nonce: Option<&str>,
    ) -> OidcResult<serde_json::Map<String, Value>> {
        let issuer = self.metadata.get_issuer().await?;
        let keys = self.metadata.get_signing_keys().await?;
        validate_id_token(
            id_token,
            &keys,
            &issuer,
            &self.settings.client_id,
            nonce,
            self.settings.clock_skew,
        )
    }

    async fn process_claims(
        &self,
        response: &mut SigninResponse,
        skip_user_info: bool,
    ) -> OidcResult<()> {
        if !response.is_open_id_connect() {
            return Ok(());
        }
        if self.settings.filter_protocol_claims {
            filter_protocol_claims(&mut response.profile);
        }

        let Some(access_token) = response.access_token.clone() else {
            return Ok(());
        };
        if !self.settings.load_user_info || skip_user_info {
            return Ok(());
        }

        let claims = self.user_info.get_claims(&access_token).await?;
        let expected = response.profile.get("sub").and_then(Value::as_str);
        let actual = claims.get("sub").and_then(Value::as_str);
        if expected.is_some() && actual != expected {
            return Err(token_validation("UserInfo sub does not match the ID token sub"));
        }

        response.profile = merge_claims(&response.profile, &claims, self.settings.merge_claims);
        self.logger.debug("process_claims: UserInfo claims merged");
        Ok(())
    }
}

pub(crate) fn apply_token_response(response: &mut SigninResponse, tokens: TokenResponse) {
    if tokens.access_token.is_some() {
        response.access_token = tokens.access_token;
    }
    if tokens.token_type.is_some() {
        response.token_type = tokens.token_type;
    }
    if tokens.id_token.is_some() {
        response.id_token = tokens.id_token;
    }
    if tokens.refresh_token.is_some() {
        response.refresh_token = tokens.refresh_token;
    }
    if tokens.scope.is_some() {
        response.scope = tokens.scope;
    }
    if tokens.expires_in.is_some() {
        response.set_expires_in(tokens.expires_in);
    }
}
