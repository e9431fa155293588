use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Bullhorn authentication error types
///
/// Cloneable so that a single failed login can be handed to every caller
/// that was waiting on it.
#[derive(Error, Debug, Clone)]
pub enum BhAuthError {
    #[error("{step} failed: {cause}. Verify credentials; browse to {consent_url} and accept terms")]
    Auth {
        step: AuthStep,
        #[source]
        cause: StepError,
        consent_url: String,
    },

    #[error("Not logged in - no REST session has been established")]
    NotLoggedIn,

    #[error("Refresh loop is already running")]
    AlreadyRunning,

    #[error("Network error: {0}")]
    Network(#[source] Arc<reqwest::Error>),

    #[error("HTTP error {status}: {body_snippet}")]
    Http {
        status: reqwest::StatusCode,
        body_snippet: String,
    },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for BhAuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(Arc::new(err))
    }
}

impl From<StepError> for BhAuthError {
    fn from(err: StepError) -> Self {
        match err {
            StepError::Network(e) => Self::Network(e),
            StepError::Http {
                status,
                body_snippet,
            } => Self::Http {
                status,
                body_snippet,
            },
            StepError::UrlParse(e) => Self::UrlParse(e),
            other => Self::InvalidResponse(other.to_string()),
        }
    }
}

impl BhAuthError {
    /// The login step that failed, if this is an acquisition failure
    pub fn step(&self) -> Option<AuthStep> {
        match self {
            Self::Auth { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// Stage of the login chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStep {
    AuthorizationCode,
    AccessToken,
    RestLogin,
    ExpiryProbe,
}

impl fmt::Display for AuthStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AuthorizationCode => "authorization code exchange",
            Self::AccessToken => "access token exchange",
            Self::RestLogin => "REST session login",
            Self::ExpiryProbe => "session expiry probe",
        };
        f.write_str(name)
    }
}

/// What went wrong inside a single step
#[derive(Error, Debug, Clone)]
pub enum StepError {
    #[error("network error: {0}")]
    Network(#[source] Arc<reqwest::Error>),

    #[error("HTTP {status}: {body_snippet}")]
    Http {
        status: reqwest::StatusCode,
        body_snippet: String,
    },

    #[error("no authorization code")]
    MissingCode,

    #[error("expected a redirect, got HTTP {0}")]
    NotRedirected(reqwest::StatusCode),

    #[error("missing field `{0}` in response")]
    MissingField(&'static str),

    #[error("malformed response body: {0}")]
    Malformed(String),

    #[error("bad URL: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl From<reqwest::Error> for StepError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(Arc::new(err))
    }
}

impl StepError {
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Self::Http {
            status,
            body_snippet: body.chars().take(200).collect(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BhAuthError>;
