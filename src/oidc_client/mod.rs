//! OpenID Connect protocol client.
//!
//! [`OidcClient`] builds authorization and end-session requests, persists
//! their correlation state in a [`crate::store::StateStore`] and validates
//! the provider's responses.
//!
//! ```no_run
//! use oidc_client::oidc_client::{OidcClient, OidcClientSettings, SigninArgs};
//!
//! # async fn run() -> oidc_client::OidcResult<()> {
//! let settings = OidcClientSettings::new("https://op.example", "spa", "https://app.example/cb")
//!     .with_response_type("code")
//!     .with_scope("openid profile");
//! let client = OidcClient::new(settings)?;
//!
//! let request = client.create_signin_request(SigninArgs::default()).await?;
//! println!("navigate to {}", request.url);
//!
//! // ...after the provider redirects back:
//! let response = client
//!     .process_signin_response("https://app.example/cb?code=...&state=...")
//!     .await?;
//! println!("signed in as {:?}", response.profile.get("sub"));
//! # Ok(())
//! # }
//! ```

mod api;
mod pkce;
mod request;
mod response;
pub mod settings;
mod state;

pub use api::{OidcClient, OidcClientBuilder};
pub use pkce::PkcePair;
pub use request::{SigninArgs, SigninRequest, SignoutArgs, SignoutRequest};
pub use response::{SigninResponse, SignoutResponse};
pub(crate) use response::split_scope;
pub use settings::{OidcClientSettings, ResponseMode};
pub use state::{clear_stale_state, RequestType, SigninState, SignoutState};
