#![doc = include_str!("RUSTDOC.md")]

pub mod error;
pub mod logger;
pub mod metadata;
pub mod oidc_client;
pub mod platform;
pub mod store;
pub mod user;
pub mod user_manager;
pub mod util;
pub mod validation;

#[cfg(test)]
pub mod test_support;

pub use error::{ErrorResponse, OidcError, OidcResult};
pub use logger::{Log, LogLevel, Logger};
pub use oidc_client::{OidcClient, OidcClientSettings, SigninArgs, SignoutArgs};
pub use user::User;
pub use user_manager::{UserManager, UserManagerSettings};
