use std::fmt;

use chrono::{DateTime, Utc};
use url::Url;
use zeroize::Zeroizing;

use crate::config::DEFAULT_CLUSTER;
use crate::errors::{BhAuthError, Result};

/// Account credentials used for the login chain
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Zeroizing<String>,
    pub client_id: String,
    pub client_secret: Zeroizing<String>,
    pub cluster: String,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
            client_id: client_id.into(),
            client_secret: Zeroizing::new(client_secret.into()),
            cluster: DEFAULT_CLUSTER.to_string(),
        }
    }

    pub fn cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = cluster.into();
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("cluster", &self.cluster)
            .finish()
    }
}

/// An established REST session
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    base_url: Url,
    session_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// The REST URL and its token always travel together
    pub fn new(base_url: &str, session_token: impl Into<String>) -> Result<Self> {
        let session_token = session_token.into();
        if session_token.is_empty() {
            return Err(BhAuthError::InvalidResponse("empty BhRestToken".to_string()));
        }

        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            session_token,
            expires_at: None,
        })
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// True when the authority-reported expiry is known to be later than `instant`
    pub fn valid_beyond(&self, instant: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at > instant)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url.as_str())
            .field("session_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
