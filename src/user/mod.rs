//! The signed-in user session record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::OidcResult;
use crate::oidc_client::SigninResponse;
use crate::util::{expires_at_from_now, seconds_until};

/// Tokens and profile of an authenticated session.
///
/// Persisted in the user store as [`User::to_storage_string`] JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default)]
    pub profile: Map<String, Value>,
    /// Absolute expiry of the access token, in epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// Application data attached to the signin request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

impl User {
    pub fn from_signin_response(response: SigninResponse) -> Self {
        Self {
            id_token: response.id_token,
            session_state: response.session_state,
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_type: response.token_type,
            scope: response.scope,
            profile: response.profile,
            expires_at: response.expires_at,
            state: response.user_state,
        }
    }

    /// Seconds until the access token expires; `None` without an expiry.
    pub fn expires_in(&self) -> Option<i64> {
        self.expires_at.map(seconds_until)
    }

    pub fn set_expires_in(&mut self, expires_in: Option<i64>) {
        self.expires_at = expires_in.and_then(expires_at_from_now);
    }

    /// `Some(true)` once `expires_in <= 0`.
    pub fn expired(&self) -> Option<bool> {
        self.expires_in().map(|expires_in| expires_in <= 0)
    }

    pub fn scopes(&self) -> Vec<String> {
        crate::oidc_client::split_scope(self.scope.as_deref())
    }

    pub fn subject(&self) -> Option<&str> {
        self.profile.get("sub").and_then(Value::as_str)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.profile.get("sid").and_then(Value::as_str)
    }

    pub fn to_storage_string(&self) -> OidcResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_storage_string(value: &str) -> OidcResult<Self> {
        Ok(serde_json::from_str(value)?)
    }
}
