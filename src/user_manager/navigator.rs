//! Front-channel navigation.
//!
//! A [`Navigator`] hands an authorization or end-session URL to whatever
//! can display it (a browser tab, popup window, hidden iframe, embedded
//! webview) and, for popup and iframe flows, waits for the callback URL.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{navigator_error, OidcResult};
use crate::logger::Logger;
use crate::oidc_client::ResponseMode;
use crate::platform::runtime::with_timeout;
use crate::util::{parse_url_params, ParamsLocation};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigatorParams {
    pub url: String,
    /// `state` of the request, used to match the callback to this window.
    pub state_id: Option<String>,
    pub response_mode: Option<ResponseMode>,
    pub window_features: Option<String>,
    pub window_target: Option<String>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavigateResponse {
    /// Callback URL carrying the provider response.
    pub url: String,
}

/// Opens windows for a flow and receives callbacks for them.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait Navigator: Send + Sync {
    async fn prepare(&self, params: &NavigatorParams) -> OidcResult<Box<dyn NavigatorWindow>>;

    /// Delivers a callback URL received by the redirect target to the window
    /// waiting for it.
    async fn callback(&self, url: &str, keep_open: bool) -> OidcResult<()> {
        let _ = (url, keep_open);
        Ok(())
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait NavigatorWindow: Send + Sync {
    /// Navigates to `params.url`. Redirect windows return once the
    /// navigation is handed off; popup and iframe windows resolve with the
    /// callback URL.
    async fn navigate(&self, params: &NavigatorParams) -> OidcResult<NavigateResponse>;

    fn close(&self);
}

/// Opens a URL on behalf of a navigator.
pub type NavigationLauncher = Arc<dyn Fn(&NavigatorParams) -> OidcResult<()> + Send + Sync>;

/// Full-page redirect. The callback arrives in a later process or page
/// load and is handled by `signin_redirect_callback`.
#[derive(Clone)]
pub struct RedirectNavigator {
    launcher: NavigationLauncher,
}

impl RedirectNavigator {
    pub fn new<F>(launcher: F) -> Self
    where
        F: Fn(&NavigatorParams) -> OidcResult<()> + Send + Sync + 'static,
    {
        Self {
            launcher: Arc::new(launcher),
        }
    }
}

struct RedirectWindow {
    launcher: NavigationLauncher,
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl Navigator for RedirectNavigator {
    async fn prepare(&self, _params: &NavigatorParams) -> OidcResult<Box<dyn NavigatorWindow>> {
        Ok(Box::new(RedirectWindow {
            launcher: self.launcher.clone(),
        }))
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl NavigatorWindow for RedirectWindow {
    async fn navigate(&self, params: &NavigatorParams) -> OidcResult<NavigateResponse> {
        (self.launcher)(params)?;
        Ok(NavigateResponse {
            url: params.url.clone(),
        })
    }

    fn close(&self) {}
}

type PendingWindows = Arc<Mutex<HashMap<String, async_channel::Sender<String>>>>;

const UNKEYED_WINDOW: &str = "";

/// Popup/iframe navigator: launches the URL, then waits until
/// [`Navigator::callback`] is called with a URL whose `state` matches.
#[derive(Clone)]
pub struct ChannelNavigator {
    launcher: NavigationLauncher,
    pending: PendingWindows,
    logger: Logger,
}

impl ChannelNavigator {
    pub fn new<F>(launcher: F) -> Self
    where
        F: Fn(&NavigatorParams) -> OidcResult<()> + Send + Sync + 'static,
    {
        Self {
            launcher: Arc::new(launcher),
            pending: Arc::new(Mutex::new(HashMap::new())),
            logger: Logger::new("ChannelNavigator"),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Number of windows still waiting for a callback.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl Navigator for ChannelNavigator {
    async fn prepare(&self, params: &NavigatorParams) -> OidcResult<Box<dyn NavigatorWindow>> {
        Ok(Box::new(ChannelWindow {
            launcher: self.launcher.clone(),
            pending: self.pending.clone(),
            key: Mutex::new(params.state_id.clone()),
            logger: self.logger.clone(),
        }))
    }

    async fn callback(&self, url: &str, keep_open: bool) -> OidcResult<()> {
        let state = callback_state(url);
        let sender = {
            let mut pending = self.pending.lock().unwrap();
            state
                .as_deref()
                .and_then(|state| pending.remove(state))
                .or_else(|| pending.remove(UNKEYED_WINDOW))
        };
        let sender = sender.ok_or_else(|| navigator_error("No window is waiting for this callback"))?;
        self.logger
            .debug(format!("callback: delivering response (keep_open: {keep_open})"));
        sender
            .send(url.to_string())
            .await
            .map_err(|_| navigator_error("Window closed before the callback arrived"))
    }
}

struct ChannelWindow {
    launcher: NavigationLauncher,
    pending: PendingWindows,
    key: Mutex<Option<String>>,
    logger: Logger,
}

impl ChannelWindow {
    fn key(&self) -> String {
        self.key
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| UNKEYED_WINDOW.to_string())
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl NavigatorWindow for ChannelWindow {
    async fn navigate(&self, params: &NavigatorParams) -> OidcResult<NavigateResponse> {
        if params.state_id.is_some() {
            *self.key.lock().unwrap() = params.state_id.clone();
        }
        let key = self.key();
        let (sender, receiver) = async_channel::bounded(1);
        self.pending.lock().unwrap().insert(key.clone(), sender);

        if let Err(err) = (self.launcher)(params) {
            self.pending.lock().unwrap().remove(&key);
            return Err(err);
        }
        self.logger.debug(format!("navigate: waiting for callback ({key})"));

        let received = match params.timeout {
            Some(timeout) => match with_timeout(timeout, receiver.recv()).await {
                Some(received) => received,
                None => {
                    self.pending.lock().unwrap().remove(&key);
                    return Err(navigator_error("Navigation timed out"));
                }
            },
            None => receiver.recv().await,
        };

        received
            .map(|url| NavigateResponse { url })
            .map_err(|_| navigator_error("Window closed by user"))
    }

    fn close(&self) {
        self.pending.lock().unwrap().remove(&self.key());
    }
}

fn callback_state(url: &str) -> Option<String> {
    [ParamsLocation::Query, ParamsLocation::Fragment]
        .into_iter()
        .find_map(|location| parse_url_params(url, location).remove("state"))
}
