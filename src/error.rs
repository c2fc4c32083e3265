use std::fmt;

use serde_json::Value;

pub type OidcResult<T> = Result<T, OidcError>;

/// Error payload returned by an identity provider (`error=...` in a callback
/// URL or a token/userinfo endpoint body).
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    pub error_description: Option<String>,
    pub error_uri: Option<String>,
    /// Application data attached to the originating request, when known.
    pub state: Option<Value>,
    pub session_state: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_description: None,
            error_uri: None,
            state: None,
            session_state: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.error_description = description;
        self
    }

    pub fn with_uri(mut self, uri: Option<String>) -> Self {
        self.error_uri = uri;
        self
    }

    /// `true` for the errors a `prompt=none` request returns when the user
    /// must interact with the provider.
    pub fn requires_interaction(&self) -> bool {
        matches!(
            self.error.as_str(),
            "login_required"
                | "consent_required"
                | "interaction_required"
                | "account_selection_required"
        )
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {}", self.error, description),
            None => f.write_str(&self.error),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OidcError {
    /// Missing or invalid settings, or metadata that lacks a required endpoint.
    Configuration { message: String },
    /// The provider answered with an OAuth2/OIDC error response.
    Protocol(ErrorResponse),
    /// Unknown, expired or already consumed `state`.
    InvalidState { message: String },
    /// Signature or claim check failed.
    TokenValidation { message: String },
    /// The ID token is past its `exp` (allowing for clock skew).
    ExpiredToken { expired_at: i64, now: i64 },
    /// Popup/iframe/redirect could not complete (closed, blocked, timed out).
    Navigator { message: String },
    Network { message: String },
    Storage { message: String },
    Serialization { message: String },
    Internal(String),
}

impl fmt::Display for OidcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OidcError::Configuration { message } => write!(f, "Invalid configuration: {message}"),
            OidcError::Protocol(response) => write!(f, "Provider returned an error: {response}"),
            OidcError::InvalidState { message } => write!(f, "Invalid state: {message}"),
            OidcError::TokenValidation { message } => {
                write!(f, "Token validation failed: {message}")
            }
            OidcError::ExpiredToken { expired_at, now } => {
                write!(f, "Token expired at {expired_at} (now {now})")
            }
            OidcError::Navigator { message } => write!(f, "Navigation failed: {message}"),
            OidcError::Network { message } => write!(f, "Network error: {message}"),
            OidcError::Storage { message } => write!(f, "Storage error: {message}"),
            OidcError::Serialization { message } => write!(f, "Serialization error: {message}"),
            OidcError::Internal(message) => write!(f, "Internal error: {message}"),
        }
    }
}

impl std::error::Error for OidcError {}

impl OidcError {
    /// Returns the provider error payload for [`OidcError::Protocol`].
    pub fn error_response(&self) -> Option<&ErrorResponse> {
        match self {
            OidcError::Protocol(response) => Some(response),
            _ => None,
        }
    }
}

pub fn configuration_error(message: impl Into<String>) -> OidcError {
    OidcError::Configuration {
        message: message.into(),
    }
}

pub fn invalid_state(message: impl Into<String>) -> OidcError {
    OidcError::InvalidState {
        message: message.into(),
    }
}

pub fn token_validation(message: impl Into<String>) -> OidcError {
    OidcError::TokenValidation {
        message: message.into(),
    }
}

pub fn navigator_error(message: impl Into<String>) -> OidcError {
    OidcError::Navigator {
        message: message.into(),
    }
}

pub fn network_error(message: impl Into<String>) -> OidcError {
    OidcError::Network {
        message: message.into(),
    }
}

pub fn storage_error(message: impl Into<String>) -> OidcError {
    OidcError::Storage {
        message: message.into(),
    }
}

impl From<serde_json::Error> for OidcError {
    fn from(error: serde_json::Error) -> Self {
        OidcError::Serialization {
            message: error.to_string(),
        }
    }
}

impl From<url::ParseError> for OidcError {
    fn from(error: url::ParseError) -> Self {
        configuration_error(format!("invalid URL: {error}"))
    }
}

impl From<reqwest::Error> for OidcError {
    fn from(error: reqwest::Error) -> Self {
        network_error(error.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for OidcError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        token_validation(error.to_string())
    }
}

impl From<ErrorResponse> for OidcError {
    fn from(response: ErrorResponse) -> Self {
        OidcError::Protocol(response)
    }
}
