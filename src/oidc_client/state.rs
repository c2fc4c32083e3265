use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OidcResult;
use crate::logger::Logger;
use crate::oidc_client::settings::ResponseMode;
use crate::store::StateStore;
use crate::util::{epoch_seconds, random_id};

/// Which flow created a state entry; used to route callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    #[serde(rename = "si:r")]
    SigninRedirect,
    #[serde(rename = "si:p")]
    SigninPopup,
    #[serde(rename = "si:s")]
    SigninSilent,
    #[serde(rename = "so:r")]
    SignoutRedirect,
    #[serde(rename = "so:p")]
    SignoutPopup,
}

/// Pending authorization request, stored under its `id` until the matching
/// callback consumes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigninState {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_type: Option<RequestType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
    pub authority: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mode: Option<ResponseMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_token_params: BTreeMap<String, String>,
    #[serde(default)]
    pub skip_user_info: bool,
}

impl SigninState {
    pub fn new(
        authority: impl Into<String>,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        response_type: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            id: random_id(),
            data: None,
            created: epoch_seconds(),
            request_type: None,
            nonce: None,
            code_verifier: None,
            authority: authority.into(),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            response_type: response_type.into(),
            scope: scope.into(),
            response_mode: None,
            client_secret: None,
            extra_token_params: BTreeMap::new(),
            skip_user_info: false,
        }
    }

    pub fn to_storage_string(&self) -> OidcResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_storage_string(value: &str) -> OidcResult<Self> {
        Ok(serde_json::from_str(value)?)
    }
}

/// Pending end-session request; only stored when the provider will redirect
/// back to a post-logout URI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignoutState {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_type: Option<RequestType>,
}

impl SignoutState {
    pub fn new(data: Option<Value>, request_type: Option<RequestType>) -> Self {
        Self {
            id: random_id(),
            data,
            created: epoch_seconds(),
            request_type,
        }
    }

    pub fn to_storage_string(&self) -> OidcResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_storage_string(value: &str) -> OidcResult<Self> {
        Ok(serde_json::from_str(value)?)
    }
}

/// Fields shared by every stored state entry.
#[derive(Debug, Deserialize)]
struct StoredStateHeader {
    created: i64,
}

/// Removes entries created more than `age` ago, plus entries that do not
/// parse as state. Returns how many entries were removed. Per-key failures
/// are logged and skipped.
pub async fn clear_stale_state(
    store: &dyn StateStore,
    age: Duration,
    logger: &Logger,
) -> OidcResult<usize> {
    let age = i64::try_from(age.as_secs()).unwrap_or(i64::MAX);
    let cutoff = epoch_seconds().saturating_sub(age);
    let keys = store.get_all_keys().await?;
    logger.debug(format!("clear_stale_state: {} key(s) found", keys.len()));

    let mut removed = 0;
    for key in keys {
        let value = match store.get(&key).await {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(err) => {
                logger.error(format!("clear_stale_state: failed to read {key}: {err}"));
                continue;
            }
        };

        let stale = match serde_json::from_str::<StoredStateHeader>(&value) {
            Ok(header) => header.created <= cutoff,
            Err(err) => {
                logger.warn(format!("clear_stale_state: unparsable entry {key}: {err}"));
                true
            }
        };
        if !stale {
            continue;
        }

        match store.remove(&key).await {
            Ok(Some(_)) => {
                logger.debug(format!("clear_stale_state: removed {key}"));
                removed += 1;
            }
            Ok(None) => {}
            Err(err) => logger.error(format!("clear_stale_state: failed to remove {key}: {err}")),
        }
    }
    Ok(removed)
}
