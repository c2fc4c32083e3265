#![cfg(not(target_arch = "wasm32"))]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use oidc_client::metadata::OidcMetadata;
use oidc_client::oidc_client::OidcClientSettings;
use oidc_client::user_manager::{
    NavigateResponse, Navigator, NavigatorParams, NavigatorWindow, UserManager,
    UserManagerSettings,
};
use oidc_client::util::{parse_url_params, ParamsLocation};
use oidc_client::{OidcResult, SigninArgs};

/// Completes every navigation immediately with an implicit-flow callback.
struct InstantNavigator {
    expires_in: u64,
    issued: Arc<Mutex<u32>>,
}

struct InstantWindow {
    expires_in: u64,
    issued: Arc<Mutex<u32>>,
}

#[async_trait]
impl Navigator for InstantNavigator {
    async fn prepare(&self, _params: &NavigatorParams) -> OidcResult<Box<dyn NavigatorWindow>> {
        Ok(Box::new(InstantWindow {
            expires_in: self.expires_in,
            issued: self.issued.clone(),
        }))
    }
}

#[async_trait]
impl NavigatorWindow for InstantWindow {
    async fn navigate(&self, params: &NavigatorParams) -> OidcResult<NavigateResponse> {
        let state = parse_url_params(&params.url, ParamsLocation::Query)
            .remove("state")
            .unwrap_or_default();
        let issued = {
            let mut issued = self.issued.lock().unwrap();
            *issued += 1;
            *issued
        };
        Ok(NavigateResponse {
            url: format!(
                "https://app.example/callback#access_token=token-{issued}&token_type=Bearer&expires_in={}&state={state}",
                self.expires_in
            ),
        })
    }

    fn close(&self) {}
}

fn settings() -> UserManagerSettings {
    let client = OidcClientSettings::new("https://op.example", "spa", "https://app.example/callback")
        .with_response_type("token")
        .with_scope("api")
        .with_load_user_info(false)
        .with_metadata(OidcMetadata {
            issuer: Some("https://op.example".into()),
            authorization_endpoint: Some("https://op.example/authorize".into()),
            ..Default::default()
        });
    UserManagerSettings::new(client)
        .with_silent_redirect_uri("https://app.example/silent")
        .with_access_token_expiring_notification_time(Duration::from_secs(1))
}

fn record(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> impl Fn(&()) + Send + Sync {
    let log = log.clone();
    move |_: &()| log.lock().unwrap().push(name)
}

#[tokio::test(flavor = "current_thread")]
async fn expiring_then_expired_then_unloaded_without_renewal() {
    let navigator = Arc::new(InstantNavigator {
        expires_in: 2,
        issued: Arc::new(Mutex::new(0)),
    });
    let manager = UserManager::builder(settings())
        .with_popup_navigator(navigator)
        .build()
        .unwrap();

    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let loaded_log = log.clone();
    let _loaded = manager.events().add_user_loaded(move |_| {
        loaded_log.lock().unwrap().push("user_loaded");
    });
    let _expiring = manager
        .events()
        .add_access_token_expiring(record(&log, "access_token_expiring"));
    let _expired = manager
        .events()
        .add_access_token_expired(record(&log, "access_token_expired"));
    let _unloaded = manager
        .events()
        .add_user_unloaded(record(&log, "user_unloaded"));

    let user = manager.signin_popup(SigninArgs::default()).await.unwrap();
    assert_eq!(user.access_token.as_deref(), Some("token-1"));

    tokio::time::sleep(Duration::from_millis(4500)).await;

    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[
            "user_loaded",
            "access_token_expiring",
            "access_token_expired",
            "user_unloaded"
        ]
    );
    assert!(manager.get_user().await.unwrap().is_none());
}

#[tokio::test(flavor = "current_thread")]
async fn automatic_silent_renew_keeps_user_signed_in() {
    let issued = Arc::new(Mutex::new(0));
    let popup = Arc::new(InstantNavigator {
        expires_in: 2,
        issued: issued.clone(),
    });
    let iframe = Arc::new(InstantNavigator {
        expires_in: 3600,
        issued: issued.clone(),
    });
    let manager = UserManager::builder(settings().with_automatic_silent_renew(true))
        .with_popup_navigator(popup)
        .with_iframe_navigator(iframe)
        .build()
        .unwrap();

    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let loaded_log = log.clone();
    let _loaded = manager.events().add_user_loaded(move |_| {
        loaded_log.lock().unwrap().push("user_loaded");
    });
    let _unloaded = manager
        .events()
        .add_user_unloaded(record(&log, "user_unloaded"));

    manager.signin_popup(SigninArgs::default()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(3500)).await;

    let user = manager.get_user().await.unwrap().unwrap();
    assert_eq!(user.access_token.as_deref(), Some("token-2"));
    assert_eq!(user.expired(), Some(false));
    assert_eq!(log.lock().unwrap().as_slice(), &["user_loaded", "user_loaded"]);
}
