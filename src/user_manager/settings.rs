use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OidcResult;
use crate::oidc_client::OidcClientSettings;
use crate::platform::environment::settings_json_from_env;

pub const DEFAULT_POPUP_WINDOW_FEATURES: &str =
    "location=no,toolbar=no,width=500,height=500,left=100,top=100";
pub const DEFAULT_POPUP_WINDOW_TARGET: &str = "_blank";
pub const DEFAULT_ACCESS_TOKEN_EXPIRING_NOTIFICATION_SECS: u64 = 60;
pub const DEFAULT_CHECK_SESSION_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_SILENT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// [`OidcClientSettings`] plus the session-management options of
/// [`crate::user_manager::UserManager`]. Client keys sit at the top level
/// when deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserManagerSettings {
    #[serde(flatten)]
    pub client: OidcClientSettings,
    /// Redirect URI for popup signin; falls back to `redirect_uri`.
    pub popup_redirect_uri: Option<String>,
    pub popup_window_features: String,
    pub popup_window_target: String,
    /// Redirect URI for iframe (silent) signin and session queries.
    pub silent_redirect_uri: Option<String>,
    /// Milliseconds before an iframe request gives up.
    pub silent_request_timeout: u64,
    pub automatic_silent_renew: bool,
    pub include_id_token_in_silent_renew: bool,
    pub monitor_session: bool,
    /// Milliseconds between check-session polls.
    pub check_session_interval: u64,
    pub revoke_access_token_on_signout: bool,
    /// Seconds before expiry at which `access_token_expiring` fires.
    pub access_token_expiring_notification_time: u64,
}

impl Default for UserManagerSettings {
    fn default() -> Self {
        Self {
            client: OidcClientSettings::default(),
            popup_redirect_uri: None,
            popup_window_features: DEFAULT_POPUP_WINDOW_FEATURES.to_string(),
            popup_window_target: DEFAULT_POPUP_WINDOW_TARGET.to_string(),
            silent_redirect_uri: None,
            silent_request_timeout: DEFAULT_SILENT_REQUEST_TIMEOUT_MS,
            automatic_silent_renew: false,
            include_id_token_in_silent_renew: true,
            monitor_session: true,
            check_session_interval: DEFAULT_CHECK_SESSION_INTERVAL_MS,
            revoke_access_token_on_signout: false,
            access_token_expiring_notification_time:
                DEFAULT_ACCESS_TOKEN_EXPIRING_NOTIFICATION_SECS,
        }
    }
}

impl From<OidcClientSettings> for UserManagerSettings {
    fn from(client: OidcClientSettings) -> Self {
        Self {
            client,
            ..Default::default()
        }
    }
}

impl UserManagerSettings {
    pub fn new(client: OidcClientSettings) -> Self {
        client.into()
    }

    /// Loads settings from `OIDC_CONFIG` and the `OIDC_*` variables.
    pub fn from_env() -> OidcResult<Self> {
        Ok(serde_json::from_value(Value::Object(settings_json_from_env()))?)
    }

    pub fn with_popup_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.popup_redirect_uri = Some(uri.into());
        self
    }

    pub fn with_silent_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.silent_redirect_uri = Some(uri.into());
        self
    }

    pub fn with_silent_request_timeout(mut self, timeout: Duration) -> Self {
        self.silent_request_timeout = timeout.as_millis() as u64;
        self
    }

    pub fn with_automatic_silent_renew(mut self, enabled: bool) -> Self {
        self.automatic_silent_renew = enabled;
        self
    }

    pub fn with_monitor_session(mut self, enabled: bool) -> Self {
        self.monitor_session = enabled;
        self
    }

    pub fn with_check_session_interval(mut self, interval: Duration) -> Self {
        self.check_session_interval = interval.as_millis() as u64;
        self
    }

    pub fn with_revoke_access_token_on_signout(mut self, enabled: bool) -> Self {
        self.revoke_access_token_on_signout = enabled;
        self
    }

    pub fn with_access_token_expiring_notification_time(mut self, time: Duration) -> Self {
        self.access_token_expiring_notification_time = time.as_secs();
        self
    }

    pub fn silent_request_timeout(&self) -> Duration {
        Duration::from_millis(self.silent_request_timeout)
    }

    pub fn check_session_interval(&self) -> Duration {
        Duration::from_millis(self.check_session_interval)
    }

    pub fn access_token_expiring_notification_time(&self) -> Duration {
        Duration::from_secs(self.access_token_expiring_notification_time)
    }
}
