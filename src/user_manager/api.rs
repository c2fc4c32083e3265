use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;

use crate::error::{configuration_error, invalid_state, ErrorResponse, OidcError, OidcResult};
use crate::logger::Logger;
use crate::metadata::MetadataService;
use crate::oidc_client::{OidcClient, RequestType, SigninArgs, SignoutArgs, SignoutResponse};
use crate::platform::runtime::spawn_detached;
use crate::store::{StateStore, WebStorageStateStore};
use crate::user::User;
use crate::user_manager::events::{EventSubscription, UserManagerEvents};
use crate::user_manager::navigator::{NavigateResponse, Navigator, NavigatorParams};
use crate::user_manager::revocation::{TokenRevocationClient, ACCESS_TOKEN_TYPE_HINT};
use crate::user_manager::session_monitor::{CheckSession, SessionMonitor, SessionStatus};
use crate::user_manager::settings::UserManagerSettings;
use crate::user_manager::silent_renew::SilentRenewService;

/// Session manager on top of [`OidcClient`]: persists the signed-in
/// [`User`], drives redirect/popup/silent flows through navigators, renews
/// access tokens and raises [`UserManagerEvents`].
pub struct UserManager {
    settings: Arc<UserManagerSettings>,
    client: OidcClient,
    user_store: Arc<dyn StateStore>,
    redirect_navigator: Option<Arc<dyn Navigator>>,
    popup_navigator: Option<Arc<dyn Navigator>>,
    iframe_navigator: Option<Arc<dyn Navigator>>,
    revocation: TokenRevocationClient,
    events: UserManagerEvents,
    silent_renew: SilentRenewService,
    session_monitor: Option<SessionMonitor>,
    expired_subscription: Mutex<Option<EventSubscription>>,
    logger: Logger,
    self_ref: Mutex<Weak<UserManager>>,
}

impl std::fmt::Debug for UserManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserManager")
            .field("authority", &self.settings.client.authority)
            .field("client_id", &self.settings.client.client_id)
            .finish()
    }
}

impl UserManager {
    pub fn new(settings: UserManagerSettings) -> OidcResult<Arc<Self>> {
        Self::builder(settings).build()
    }

    pub fn builder(settings: UserManagerSettings) -> UserManagerBuilder {
        UserManagerBuilder::new(settings)
    }

    pub fn settings(&self) -> &UserManagerSettings {
        &self.settings
    }

    pub fn client(&self) -> &OidcClient {
        &self.client
    }

    pub fn metadata_service(&self) -> &Arc<MetadataService> {
        self.client.metadata_service()
    }

    pub fn events(&self) -> &UserManagerEvents {
        &self.events
    }

    /// Returns the stored user and re-arms its expiry timers.
    pub async fn get_user(&self) -> OidcResult<Option<User>> {
        let user = self.load_user().await?;
        match &user {
            Some(user) => {
                self.logger.debug("get_user: user loaded from store");
                self.events.load(user, false);
                if let Some(monitor) = &self.session_monitor {
                    if !monitor.is_running() {
                        monitor.start(self.weak(), user);
                    }
                }
            }
            None => self.logger.debug("get_user: no user in store"),
        }
        Ok(user)
    }

    /// Writes `user` to the user store, or clears the entry for `None`.
    pub async fn store_user(&self, user: Option<&User>) -> OidcResult<()> {
        let key = self.user_store_key();
        match user {
            Some(user) => {
                self.user_store.set(&key, user.to_storage_string()?).await?;
                self.logger.debug("store_user: user stored");
            }
            None => {
                self.user_store.remove(&key).await?;
                self.logger.debug("store_user: user removed");
            }
        }
        Ok(())
    }

    /// Clears the stored user and raises `user_unloaded`.
    pub async fn remove_user(&self) -> OidcResult<()> {
        self.store_user(None).await?;
        if let Some(monitor) = &self.session_monitor {
            monitor.stop();
        }
        self.events.unload();
        Ok(())
    }

    pub async fn signin_redirect(&self, args: SigninArgs) -> OidcResult<()> {
        let navigator = required(&self.redirect_navigator, "redirect")?;
        let args = SigninArgs {
            request_type: Some(RequestType::SigninRedirect),
            ..args
        };
        self.signin_start(navigator.as_ref(), args, NavigatorParams::default())
            .await?;
        Ok(())
    }

    pub async fn signin_redirect_callback(&self, url: &str) -> OidcResult<User> {
        self.signin_end(url, None).await
    }

    pub async fn signin_popup(&self, args: SigninArgs) -> OidcResult<User> {
        let navigator = required(&self.popup_navigator, "popup")?;
        let redirect_uri = args
            .redirect_uri
            .clone()
            .or_else(|| self.settings.popup_redirect_uri.clone())
            .or_else(|| non_empty(&self.settings.client.redirect_uri))
            .ok_or_else(|| configuration_error("No popup_redirect_uri or redirect_uri configured"))?;
        let args = SigninArgs {
            redirect_uri: Some(redirect_uri),
            request_type: Some(RequestType::SigninPopup),
            ..args
        };

        let response = self
            .signin_start(navigator.as_ref(), args, self.popup_params())
            .await?;
        self.signin_end(&response.url, None).await
    }

    pub async fn signin_popup_callback(&self, url: &str, keep_open: bool) -> OidcResult<()> {
        required(&self.popup_navigator, "popup")?
            .callback(url, keep_open)
            .await
    }

    /// Renews the session without user interaction: the refresh-token grant
    /// when the current user holds a refresh token, otherwise a
    /// `prompt=none` request through the iframe navigator.
    pub async fn signin_silent(&self, args: SigninArgs) -> OidcResult<User> {
        let current = self.load_user().await?;
        if let Some(user) = current.clone() {
            if let Some(refresh_token) = user.refresh_token.clone() {
                return self.use_refresh_token(user, &refresh_token).await;
            }
        }

        let navigator = required(&self.iframe_navigator, "iframe")?;
        let redirect_uri = args
            .redirect_uri
            .clone()
            .or_else(|| self.settings.silent_redirect_uri.clone())
            .ok_or_else(|| configuration_error("No silent_redirect_uri configured"))?;
        let mut args = SigninArgs {
            redirect_uri: Some(redirect_uri),
            prompt: Some("none".to_string()),
            request_type: Some(RequestType::SigninSilent),
            ..args
        };
        if args.id_token_hint.is_none() && self.settings.include_id_token_in_silent_renew {
            args.id_token_hint = current.as_ref().and_then(|user| user.id_token.clone());
        }

        let response = self
            .signin_start(navigator.as_ref(), args, self.silent_params())
            .await?;
        let verify_sub = current
            .as_ref()
            .and_then(|user| user.subject())
            .map(str::to_string);
        self.signin_end(&response.url, verify_sub.as_deref()).await
    }

    pub async fn signin_silent_callback(&self, url: &str) -> OidcResult<()> {
        required(&self.iframe_navigator, "iframe")?
            .callback(url, false)
            .await
    }

    /// Completes whichever signin flow produced `url`, based on the request
    /// type stored with its state. Only the redirect flow yields a user here;
    /// popup and silent callbacks are handed to the waiting window.
    pub async fn signin_callback(&self, url: &str) -> OidcResult<Option<User>> {
        let (state, _) = self.client.read_signin_response_state(url, false).await?;
        match state.request_type {
            None | Some(RequestType::SigninRedirect) => {
                self.signin_redirect_callback(url).await.map(Some)
            }
            Some(RequestType::SigninPopup) => {
                self.signin_popup_callback(url, false).await?;
                Ok(None)
            }
            Some(RequestType::SigninSilent) => {
                self.signin_silent_callback(url).await?;
                Ok(None)
            }
            Some(other) => Err(invalid_state(format!(
                "Unexpected request type {other:?} for a signin callback"
            ))),
        }
    }

    pub async fn signout_redirect(&self, args: SignoutArgs) -> OidcResult<()> {
        let navigator = required(&self.redirect_navigator, "redirect")?;
        let args = SignoutArgs {
            request_type: Some(RequestType::SignoutRedirect),
            ..args
        };
        self.signout_start(navigator.as_ref(), args, NavigatorParams::default())
            .await?;
        Ok(())
    }

    pub async fn signout_redirect_callback(&self, url: &str) -> OidcResult<SignoutResponse> {
        self.client.process_signout_response(url).await
    }

    pub async fn signout_popup(&self, args: SignoutArgs) -> OidcResult<SignoutResponse> {
        let navigator = required(&self.popup_navigator, "popup")?;
        let post_logout_redirect_uri = args
            .post_logout_redirect_uri
            .clone()
            .or_else(|| self.settings.client.popup_post_logout_redirect_uri.clone())
            .or_else(|| self.settings.client.post_logout_redirect_uri.clone());
        let args = SignoutArgs {
            post_logout_redirect_uri,
            request_type: Some(RequestType::SignoutPopup),
            ..args
        };

        let response = self
            .signout_start(navigator.as_ref(), args, self.popup_params())
            .await?;
        self.client.process_signout_response(&response.url).await
    }

    pub async fn signout_popup_callback(&self, url: &str, keep_open: bool) -> OidcResult<()> {
        required(&self.popup_navigator, "popup")?
            .callback(url, keep_open)
            .await
    }

    /// Signout counterpart of [`UserManager::signin_callback`].
    pub async fn signout_callback(
        &self,
        url: &str,
        keep_open: bool,
    ) -> OidcResult<Option<SignoutResponse>> {
        let (state, _) = self.client.read_signout_response_state(url, false).await?;
        match state.and_then(|state| state.request_type) {
            None | Some(RequestType::SignoutRedirect) => {
                self.signout_redirect_callback(url).await.map(Some)
            }
            Some(RequestType::SignoutPopup) => {
                self.signout_popup_callback(url, keep_open).await?;
                Ok(None)
            }
            Some(other) => Err(invalid_state(format!(
                "Unexpected request type {other:?} for a signout callback"
            ))),
        }
    }

    /// Asks the provider, without interaction, who is signed in. Returns
    /// `None` when nobody is or when the provider requires interaction.
    pub async fn query_session_status(&self, args: SigninArgs) -> OidcResult<Option<SessionStatus>> {
        let navigator = required(&self.iframe_navigator, "iframe")?;
        let redirect_uri = args
            .redirect_uri
            .clone()
            .or_else(|| self.settings.silent_redirect_uri.clone())
            .ok_or_else(|| configuration_error("No silent_redirect_uri configured"))?;
        let args = SigninArgs {
            redirect_uri: Some(redirect_uri),
            response_type: Some("id_token".to_string()),
            scope: Some("openid".to_string()),
            prompt: Some("none".to_string()),
            request_type: Some(RequestType::SigninSilent),
            skip_user_info: true,
            ..args
        };

        let response = self
            .signin_start(navigator.as_ref(), args, self.silent_params())
            .await?;
        let signin = match self.client.process_signin_response(&response.url).await {
            Ok(signin) => signin,
            Err(OidcError::Protocol(error)) if error.requires_interaction() => {
                self.logger
                    .debug(format!("query_session_status: {}", error.error));
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let sub = signin.profile.get("sub").and_then(Value::as_str);
        match (signin.session_state.clone(), sub) {
            (Some(session_state), Some(sub)) => Ok(Some(SessionStatus {
                session_state,
                sub: sub.to_string(),
                sid: signin
                    .profile
                    .get("sid")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })),
            _ => {
                self.logger.info("query_session_status: no session state in response");
                Ok(None)
            }
        }
    }

    /// Revokes the stored user's access token and drops it from the user.
    pub async fn revoke_access_token(&self) -> OidcResult<()> {
        let Some(mut user) = self.load_user().await? else {
            return Ok(());
        };
        if self.revoke_internal(&user).await? {
            user.access_token = None;
            user.token_type = None;
            user.expires_at = None;
            self.store_user(Some(&user)).await?;
            self.events.load(&user, true);
            self.logger.debug("revoke_access_token: access token revoked");
        }
        Ok(())
    }

    pub fn start_silent_renew(&self) {
        self.silent_renew.start(&self.events, self.weak());
    }

    pub fn stop_silent_renew(&self) {
        self.silent_renew.stop();
    }

    pub fn is_silent_renew_started(&self) -> bool {
        self.silent_renew.is_started()
    }

    pub async fn clear_stale_state(&self) -> OidcResult<usize> {
        self.client.clear_stale_state().await
    }

    async fn signin_start(
        &self,
        navigator: &dyn Navigator,
        args: SigninArgs,
        params: NavigatorParams,
    ) -> OidcResult<NavigateResponse> {
        let window = navigator.prepare(&params).await?;
        let request = match self.client.create_signin_request(args).await {
            Ok(request) => request,
            Err(err) => {
                window.close();
                return Err(err);
            }
        };

        let params = NavigatorParams {
            url: request.url,
            state_id: Some(request.state.id),
            response_mode: request.state.response_mode,
            ..params
        };
        self.logger.debug("signin_start: navigating to authorization endpoint");
        let result = window.navigate(&params).await;
        if result.is_err() {
            window.close();
        }
        result
    }

    async fn signin_end(&self, url: &str, verify_sub: Option<&str>) -> OidcResult<User> {
        let response = self.client.process_signin_response(url).await?;
        if let Some(expected) = verify_sub {
            let sub = response.profile.get("sub").and_then(Value::as_str);
            if sub.is_some() && sub != Some(expected) {
                self.logger
                    .debug("signin_end: subject changed during silent signin");
                return Err(ErrorResponse::new("login_required")
                    .with_description(Some("Signed in user changed".to_string()))
                    .into());
            }
        }

        let user = User::from_signin_response(response);
        self.store_user(Some(&user)).await?;
        self.events.load(&user, true);
        if let Some(monitor) = &self.session_monitor {
            monitor.start(self.weak(), &user);
        }
        self.logger.info("signin_end: user loaded");
        Ok(user)
    }

    async fn use_refresh_token(&self, mut user: User, refresh_token: &str) -> OidcResult<User> {
        let expected_sub = user.subject().map(str::to_string);
        let response = self
            .client
            .use_refresh_token(refresh_token, user.scope.as_deref(), expected_sub.as_deref())
            .await?;

        user.access_token = response.access_token;
        user.refresh_token = response.refresh_token;
        user.expires_at = response.expires_at;
        if response.token_type.is_some() {
            user.token_type = response.token_type;
        }
        if response.scope.is_some() {
            user.scope = response.scope;
        }
        if response.id_token.is_some() {
            user.id_token = response.id_token;
            user.profile = response.profile;
        }

        self.store_user(Some(&user)).await?;
        self.events.load(&user, true);
        self.logger.debug("use_refresh_token: user renewed");
        Ok(user)
    }

    async fn signout_start(
        &self,
        navigator: &dyn Navigator,
        mut args: SignoutArgs,
        params: NavigatorParams,
    ) -> OidcResult<NavigateResponse> {
        let window = navigator.prepare(&params).await?;

        let request = async move {
            if let Some(user) = self.load_user().await? {
                if args.id_token_hint.is_none() {
                    args.id_token_hint = user.id_token.clone();
                }
                if self.settings.revoke_access_token_on_signout {
                    self.revoke_internal(&user).await?;
                }
            }
            self.remove_user().await?;
            self.client.create_signout_request(args).await
        }
        .await;
        let request = match request {
            Ok(request) => request,
            Err(err) => {
                window.close();
                return Err(err);
            }
        };

        let params = NavigatorParams {
            url: request.url,
            state_id: request.state.map(|state| state.id),
            ..params
        };
        self.logger.debug("signout_start: navigating to end session endpoint");
        let result = window.navigate(&params).await;
        if result.is_err() {
            window.close();
        }
        result
    }

    async fn revoke_internal(&self, user: &User) -> OidcResult<bool> {
        match &user.access_token {
            Some(token) => {
                self.revocation.revoke(token, ACCESS_TOKEN_TYPE_HINT).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn load_user(&self) -> OidcResult<Option<User>> {
        match self.user_store.get(&self.user_store_key()).await? {
            Some(stored) => Ok(Some(User::from_storage_string(&stored)?)),
            None => Ok(None),
        }
    }

    async fn handle_access_token_expired(&self) -> OidcResult<()> {
        self.logger.debug("access token expired");
        if let Some(user) = self.load_user().await? {
            if user.expired() == Some(true) {
                self.remove_user().await?;
            }
        }
        Ok(())
    }

    fn install_expired_handler(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let subscription = self.events.add_access_token_expired(move |_| {
            let Some(manager) = weak.upgrade() else {
                return;
            };
            spawn_detached(async move {
                if let Err(err) = manager.handle_access_token_expired().await {
                    manager
                        .logger
                        .warn(format!("failed to unload expired user: {err}"));
                }
            });
        });
        *self.expired_subscription.lock().unwrap() = Some(subscription);
    }

    fn user_store_key(&self) -> String {
        format!(
            "user:{}:{}",
            self.settings.client.authority, self.settings.client.client_id
        )
    }

    fn popup_params(&self) -> NavigatorParams {
        NavigatorParams {
            window_features: Some(self.settings.popup_window_features.clone()),
            window_target: Some(self.settings.popup_window_target.clone()),
            ..Default::default()
        }
    }

    fn silent_params(&self) -> NavigatorParams {
        NavigatorParams {
            timeout: Some(self.settings.silent_request_timeout()),
            ..Default::default()
        }
    }

    fn weak(&self) -> Weak<UserManager> {
        self.self_ref.lock().unwrap().clone()
    }
}

fn required<'a>(
    navigator: &'a Option<Arc<dyn Navigator>>,
    kind: &str,
) -> OidcResult<&'a Arc<dyn Navigator>> {
    navigator
        .as_ref()
        .ok_or_else(|| configuration_error(format!("No {kind} navigator configured")))
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

pub struct UserManagerBuilder {
    settings: UserManagerSettings,
    state_store: Option<Arc<dyn StateStore>>,
    user_store: Option<Arc<dyn StateStore>>,
    redirect_navigator: Option<Arc<dyn Navigator>>,
    popup_navigator: Option<Arc<dyn Navigator>>,
    iframe_navigator: Option<Arc<dyn Navigator>>,
    check_session: Option<Arc<dyn CheckSession>>,
    logger: Option<Logger>,
    http: Option<reqwest::Client>,
}

impl UserManagerBuilder {
    fn new(settings: UserManagerSettings) -> Self {
        Self {
            settings,
            state_store: None,
            user_store: None,
            redirect_navigator: None,
            popup_navigator: None,
            iframe_navigator: None,
            check_session: None,
            logger: None,
            http: None,
        }
    }

    /// Store for pending request state.
    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    /// Store for the signed-in user. Defaults to an in-memory
    /// [`WebStorageStateStore`].
    pub fn with_user_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.user_store = Some(store);
        self
    }

    pub fn with_redirect_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.redirect_navigator = Some(navigator);
        self
    }

    pub fn with_popup_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.popup_navigator = Some(navigator);
        self
    }

    pub fn with_iframe_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.iframe_navigator = Some(navigator);
        self
    }

    /// Enables session monitoring when `monitor_session` is set.
    pub fn with_check_session(mut self, check_session: Arc<dyn CheckSession>) -> Self {
        self.check_session = Some(check_session);
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> OidcResult<Arc<UserManager>> {
        let logger = self.logger.unwrap_or_else(|| Logger::new("UserManager"));

        let mut client = OidcClient::builder(self.settings.client.clone())
            .with_logger(logger.child("OidcClient"));
        if let Some(store) = self.state_store {
            client = client.with_state_store(store);
        }
        if let Some(http) = self.http {
            client = client.with_http_client(http);
        }
        let client = client.build()?;

        let revocation = TokenRevocationClient::new(
            client.json_service().clone(),
            client.metadata_service().clone(),
            self.settings.client.client_id.clone(),
            self.settings.client.client_secret.clone(),
        )
        .with_logger(logger.child("TokenRevocationClient"));

        let session_monitor = if self.settings.monitor_session {
            self.check_session.map(|check_session| {
                SessionMonitor::new(
                    check_session,
                    self.settings.check_session_interval(),
                    logger.child("SessionMonitor"),
                )
            })
        } else {
            None
        };

        let settings = Arc::new(self.settings);
        let manager = Arc::new(UserManager {
            events: UserManagerEvents::new(settings.access_token_expiring_notification_time),
            silent_renew: SilentRenewService::new(logger.child("SilentRenewService")),
            user_store: self
                .user_store
                .unwrap_or_else(|| Arc::new(WebStorageStateStore::default())),
            redirect_navigator: self.redirect_navigator,
            popup_navigator: self.popup_navigator,
            iframe_navigator: self.iframe_navigator,
            client,
            revocation,
            session_monitor,
            expired_subscription: Mutex::new(None),
            settings,
            logger,
            self_ref: Mutex::new(Weak::new()),
        });
        *manager.self_ref.lock().unwrap() = Arc::downgrade(&manager);

        manager.install_expired_handler();
        if manager.settings.automatic_silent_renew {
            manager.start_silent_renew();
        }
        Ok(manager)
    }
}
