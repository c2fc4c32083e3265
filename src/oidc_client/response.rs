use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::ErrorResponse;
use crate::oidc_client::settings::ResponseMode;
use crate::util::{expires_at_from_now, parse_url_params, seconds_until, ParamsLocation};

const OPENID_SCOPE: &str = "openid";

impl From<ResponseMode> for ParamsLocation {
    fn from(mode: ResponseMode) -> Self {
        match mode {
            ResponseMode::Query => ParamsLocation::Query,
            ResponseMode::Fragment => ParamsLocation::Fragment,
        }
    }
}

/// Authorization response read from a callback URL, later completed with
/// token-endpoint results and profile claims.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SigninResponse {
    /// Raw `state` parameter: the id of the stored request.
    pub state: Option<String>,
    /// Application data attached to the request, restored from the store.
    pub user_state: Option<Value>,
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub error_uri: Option<String>,
    pub id_token: Option<String>,
    pub session_state: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub expires_at: Option<i64>,
    pub profile: Map<String, Value>,
}

impl SigninResponse {
    pub fn from_url(url: &str, mode: ResponseMode) -> Self {
        Self::from_params(parse_url_params(url, mode.into()))
    }

    pub fn from_params(mut params: HashMap<String, String>) -> Self {
        let expires_at = params
            .remove("expires_in")
            .and_then(|value| value.parse::<i64>().ok())
            .and_then(expires_at_from_now);

        Self {
            state: params.remove("state"),
            user_state: None,
            code: params.remove("code"),
            error: params.remove("error"),
            error_description: params.remove("error_description"),
            error_uri: params.remove("error_uri"),
            id_token: params.remove("id_token"),
            session_state: params.remove("session_state"),
            access_token: params.remove("access_token"),
            refresh_token: params.remove("refresh_token"),
            token_type: params.remove("token_type"),
            scope: params.remove("scope"),
            expires_at,
            profile: Map::new(),
        }
    }

    /// Seconds until `expires_at`; negative once expired.
    pub fn expires_in(&self) -> Option<i64> {
        self.expires_at.map(seconds_until)
    }

    pub fn set_expires_in(&mut self, expires_in: Option<i64>) {
        self.expires_at = expires_in.and_then(expires_at_from_now);
    }

    pub fn expired(&self) -> Option<bool> {
        self.expires_in().map(|expires_in| expires_in <= 0)
    }

    pub fn scopes(&self) -> Vec<String> {
        split_scope(self.scope.as_deref())
    }

    pub fn is_open_id_connect(&self) -> bool {
        self.id_token.is_some() || self.scopes().iter().any(|scope| scope == OPENID_SCOPE)
    }

    pub fn error_response(&self) -> Option<ErrorResponse> {
        let error = self.error.as_ref()?;
        let mut response = ErrorResponse::new(error.clone())
            .with_description(self.error_description.clone())
            .with_uri(self.error_uri.clone());
        response.state = self.user_state.clone();
        response.session_state = self.session_state.clone();
        Some(response)
    }
}

/// End-session response read from a post-logout callback URL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignoutResponse {
    pub state: Option<String>,
    pub user_state: Option<Value>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub error_uri: Option<String>,
}

impl SignoutResponse {
    /// End-session responses always come back on the query string.
    pub fn from_url(url: &str) -> Self {
        let mut params = parse_url_params(url, ParamsLocation::Query);
        Self {
            state: params.remove("state"),
            user_state: None,
            error: params.remove("error"),
            error_description: params.remove("error_description"),
            error_uri: params.remove("error_uri"),
        }
    }

    pub fn error_response(&self) -> Option<ErrorResponse> {
        let error = self.error.as_ref()?;
        let mut response = ErrorResponse::new(error.clone())
            .with_description(self.error_description.clone())
            .with_uri(self.error_uri.clone());
        response.state = self.user_state.clone();
        Some(response)
    }
}

pub(crate) fn split_scope(scope: Option<&str>) -> Vec<String> {
    scope
        .map(|scope| scope.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implicit_fragment_is_parsed() {
        let response = SigninResponse::from_url(
            "https://app/cb#access_token=at&token_type=Bearer&expires_in=300&scope=openid%20email&state=s1&session_state=ss",
            ResponseMode::Fragment,
        );

        assert_eq!(response.access_token.as_deref(), Some("at"));
        assert_eq!(response.state.as_deref(), Some("s1"));
        assert_eq!(response.scopes(), vec!["openid", "email"]);
        assert!(response.is_open_id_connect());
        let expires_in = response.expires_in().unwrap();
        assert!((299..=300).contains(&expires_in));
        assert_eq!(response.expired(), Some(false));
        assert!(response.error_response().is_none());
    }

    #[test]
    fn code_response_reads_query_only() {
        let response = SigninResponse::from_url(
            "https://app/cb?code=abc&state=s1#ignored=1",
            ResponseMode::Query,
        );
        assert_eq!(response.code.as_deref(), Some("abc"));
        assert_eq!(response.expires_at, None);
        assert_eq!(response.expired(), None);
    }

    #[test]
    fn out_of_range_expires_in_leaves_expiry_unset() {
        let huge = SigninResponse::from_url(
            "https://app/cb#state=s1&expires_in=9223372036854775807",
            ResponseMode::Fragment,
        );
        assert_eq!(huge.expires_at, None);

        let negative = SigninResponse::from_url(
            "https://app/cb#state=s1&expires_in=-10",
            ResponseMode::Fragment,
        );
        assert_eq!(negative.expires_at, None);

        let mut response = SigninResponse::default();
        response.set_expires_in(Some(i64::MAX));
        assert_eq!(response.expires_at, None);
    }

    #[test]
    fn error_fields_build_error_response() {
        let response = SigninResponse::from_url(
            "https://app/cb#error=access_denied&error_description=denied&state=s1",
            ResponseMode::Fragment,
        );
        let error = response.error_response().unwrap();
        assert_eq!(error.error, "access_denied");
        assert_eq!(error.error_description.as_deref(), Some("denied"));
    }

    #[test]
    fn signout_response_reads_query() {
        let response = SignoutResponse::from_url("https://app/logged-out?state=abc");
        assert_eq!(response.state.as_deref(), Some("abc"));
        assert!(response.error_response().is_none());
    }
}
