use std::time::Duration;
use url::Url;

use crate::errors::{BhAuthError, Result};

/// Cluster used when none is configured
pub const DEFAULT_CLUSTER: &str = "emea";

/// REST session lifetime requested at login, in minutes (48 hours)
pub const DEFAULT_SESSION_TTL_MINUTES: u32 = 2880;

/// Bullhorn endpoint templates, `{cluster}` is substituted per account
pub mod endpoints {
    pub const AUTHORIZE: &str = "https://auth-{cluster}.bullhornstaffing.com/oauth/authorize";
    pub const TOKEN: &str = "https://auth-{cluster}.bullhornstaffing.com/oauth/token";
    pub const REST_LOGIN: &str = "https://rest-{cluster}.bullhornstaffing.com/rest-services/login";
}

/// Where the login chain talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    pub authorize: Url,
    pub token: Url,
    pub rest_login: Url,
}

impl AuthEndpoints {
    /// Public Bullhorn endpoints for a data-center cluster (e.g. `emea`, `us`)
    pub fn for_cluster(cluster: &str) -> Result<Self> {
        if cluster.is_empty() || !cluster.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(BhAuthError::Config(format!("invalid cluster name: {cluster:?}")));
        }

        let expand = |template: &str| Url::parse(&template.replace("{cluster}", cluster));
        Ok(Self {
            authorize: expand(endpoints::AUTHORIZE)?,
            token: expand(endpoints::TOKEN)?,
            rest_login: expand(endpoints::REST_LOGIN)?,
        })
    }

    /// All three endpoints under one base URL, as served by a proxy or a mock authority
    pub fn with_base(base: &Url) -> Result<Self> {
        Ok(Self {
            authorize: base.join("oauth/authorize")?,
            token: base.join("oauth/token")?,
            rest_login: base.join("rest-services/login")?,
        })
    }

    pub fn custom(authorize: Url, token: Url, rest_login: Url) -> Self {
        Self {
            authorize,
            token,
            rest_login,
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            request: Duration::from_secs(30),
        }
    }
}

/// Configuration for TokenAcquirer
#[derive(Debug, Clone)]
pub struct BhAuthConfig {
    /// Fixed endpoints; `None` derives them from the credentials' cluster
    pub endpoints: Option<AuthEndpoints>,

    /// HTTP client timeouts
    pub http_timeouts: HttpTimeouts,

    /// Custom user agent (optional)
    pub user_agent: Option<String>,
}

impl BhAuthConfig {
    /// Pin every request to the given endpoints regardless of cluster
    pub fn with_endpoints(endpoints: AuthEndpoints) -> Self {
        Self {
            endpoints: Some(endpoints),
            ..Self::default()
        }
    }

    pub(crate) fn endpoints_for(&self, cluster: &str) -> Result<AuthEndpoints> {
        match &self.endpoints {
            Some(endpoints) => Ok(endpoints.clone()),
            None => AuthEndpoints::for_cluster(cluster),
        }
    }
}

impl Default for BhAuthConfig {
    fn default() -> Self {
        Self {
            endpoints: None,
            http_timeouts: HttpTimeouts::default(),
            user_agent: Some("bh-keeper".to_string()),
        }
    }
}
