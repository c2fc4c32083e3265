//! Session management on top of [`crate::oidc_client::OidcClient`].
//!
//! [`UserManager`] keeps the signed-in [`crate::user::User`] in a user
//! store, runs redirect, popup and silent flows through pluggable
//! [`Navigator`]s, renews access tokens before they expire and can follow the
//! provider session through a [`CheckSession`] implementation. Lifecycle
//! changes are published on [`UserManagerEvents`].

mod api;
mod events;
mod navigator;
mod revocation;
mod session_monitor;
mod settings;
mod silent_renew;
mod timer;

pub use api::{UserManager, UserManagerBuilder};
pub use events::{EventChannel, EventListener, EventSubscription, UserManagerEvents};
pub use navigator::{
    ChannelNavigator, NavigateResponse, NavigationLauncher, Navigator, NavigatorParams,
    NavigatorWindow, RedirectNavigator,
};
pub use revocation::{TokenRevocationClient, ACCESS_TOKEN_TYPE_HINT};
pub use session_monitor::{CheckSession, CheckSessionStatus, SessionStatus};
pub use settings::{
    UserManagerSettings, DEFAULT_ACCESS_TOKEN_EXPIRING_NOTIFICATION_SECS,
    DEFAULT_CHECK_SESSION_INTERVAL_MS, DEFAULT_POPUP_WINDOW_FEATURES, DEFAULT_POPUP_WINDOW_TARGET,
    DEFAULT_SILENT_REQUEST_TIMEOUT_MS,
};
pub use timer::{AccessTokenEvents, Timer};
