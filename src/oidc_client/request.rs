use std::collections::BTreeMap;

use serde_json::Value;
use url::Url;

use crate::error::OidcResult;
use crate::oidc_client::pkce::CODE_CHALLENGE_METHOD;
use crate::oidc_client::settings::ResponseMode;
use crate::oidc_client::state::{RequestType, SigninState, SignoutState};

/// Per-call overrides for [`crate::oidc_client::OidcClient::create_signin_request`].
/// Unset fields fall back to the client settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SigninArgs {
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    pub scope: Option<String>,
    pub response_mode: Option<ResponseMode>,
    /// Application data returned on the matching response.
    pub data: Option<Value>,
    pub prompt: Option<String>,
    pub display: Option<String>,
    pub max_age: Option<u64>,
    pub ui_locales: Option<String>,
    pub id_token_hint: Option<String>,
    pub login_hint: Option<String>,
    pub acr_values: Option<String>,
    pub resource: Option<String>,
    pub request: Option<String>,
    pub request_uri: Option<String>,
    pub extra_query_params: BTreeMap<String, String>,
    pub extra_token_params: BTreeMap<String, String>,
    pub request_type: Option<RequestType>,
    pub skip_user_info: bool,
}

impl SigninArgs {
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_id_token_hint(mut self, hint: impl Into<String>) -> Self {
        self.id_token_hint = Some(hint.into());
        self
    }

    pub fn with_login_hint(mut self, hint: impl Into<String>) -> Self {
        self.login_hint = Some(hint.into());
        self
    }

    pub fn with_request_type(mut self, request_type: RequestType) -> Self {
        self.request_type = Some(request_type);
        self
    }

    pub fn with_extra_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_query_params.insert(key.into(), value.into());
        self
    }
}

/// Per-call overrides for [`crate::oidc_client::OidcClient::create_signout_request`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignoutArgs {
    pub id_token_hint: Option<String>,
    pub post_logout_redirect_uri: Option<String>,
    pub data: Option<Value>,
    pub extra_query_params: BTreeMap<String, String>,
    pub request_type: Option<RequestType>,
}

impl SignoutArgs {
    pub fn with_id_token_hint(mut self, hint: impl Into<String>) -> Self {
        self.id_token_hint = Some(hint.into());
        self
    }

    pub fn with_post_logout_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.post_logout_redirect_uri = Some(uri.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Authorization request ready for navigation. `state` is already persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SigninRequest {
    pub url: String,
    pub state: SigninState,
}

impl SigninRequest {
    pub(crate) fn new(
        authorization_endpoint: &str,
        state: SigninState,
        code_challenge: Option<&str>,
        optional_params: &[(String, String)],
    ) -> OidcResult<Self> {
        let mut url = Url::parse(authorization_endpoint)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("client_id", &state.client_id);
            pairs.append_pair("redirect_uri", &state.redirect_uri);
            pairs.append_pair("response_type", &state.response_type);
            pairs.append_pair("scope", &state.scope);
            pairs.append_pair("state", &state.id);
            if let Some(nonce) = &state.nonce {
                pairs.append_pair("nonce", nonce);
            }
            if let Some(challenge) = code_challenge {
                pairs.append_pair("code_challenge", challenge);
                pairs.append_pair("code_challenge_method", CODE_CHALLENGE_METHOD);
            }
            for (key, value) in optional_params {
                pairs.append_pair(key, value);
            }
        }

        Ok(Self {
            url: url.into(),
            state,
        })
    }
}

/// End-session request. `state` is present only when a post-logout redirect
/// was requested.
#[derive(Debug, Clone, PartialEq)]
pub struct SignoutRequest {
    pub url: String,
    pub state: Option<SignoutState>,
}

impl SignoutRequest {
    pub(crate) fn new(
        end_session_endpoint: &str,
        id_token_hint: Option<&str>,
        post_logout_redirect_uri: Option<&str>,
        state: Option<SignoutState>,
        extra_query_params: &BTreeMap<String, String>,
    ) -> OidcResult<Self> {
        let mut url = Url::parse(end_session_endpoint)?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(hint) = id_token_hint {
                pairs.append_pair("id_token_hint", hint);
            }
            if let Some(uri) = post_logout_redirect_uri {
                pairs.append_pair("post_logout_redirect_uri", uri);
                if let Some(state) = &state {
                    pairs.append_pair("state", &state.id);
                }
            }
            for (key, value) in extra_query_params {
                pairs.append_pair(key, value);
            }
        }

        Ok(Self {
            url: url.into(),
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{parse_url_params, ParamsLocation};

    #[test]
    fn signin_url_carries_protocol_parameters() {
        let mut state = SigninState::new("https://op", "spa", "https://app/cb", "code", "openid");
        state.nonce = Some("n-1".into());
        let request = SigninRequest::new(
            "https://op/authorize?tenant=x",
            state.clone(),
            Some("challenge"),
            &[("prompt".to_string(), "login".to_string())],
        )
        .unwrap();

        let params = parse_url_params(&request.url, ParamsLocation::Query);
        assert_eq!(params["tenant"], "x");
        assert_eq!(params["client_id"], "spa");
        assert_eq!(params["redirect_uri"], "https://app/cb");
        assert_eq!(params["state"], state.id);
        assert_eq!(params["nonce"], "n-1");
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["prompt"], "login");
    }

    #[test]
    fn signout_state_is_only_sent_with_redirect() {
        let request = SignoutRequest::new(
            "https://op/logout",
            Some("id-token"),
            None,
            None,
            &BTreeMap::new(),
        )
        .unwrap();
        let params = parse_url_params(&request.url, ParamsLocation::Query);
        assert_eq!(params["id_token_hint"], "id-token");
        assert!(!params.contains_key("state"));
        assert!(request.state.is_none());
    }
}
