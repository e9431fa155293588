use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use bh_auth::{BhAuthConfig, Credentials, HttpTimeouts, DEFAULT_CLUSTER, DEFAULT_SESSION_TTL_MINUTES};
use bh_session::{CachingOptions, ManagedOptions};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, instrument};
use zeroize::Zeroizing;

pub const PASSWORD_ENV: &str = "BH_PASSWORD";
pub const CLIENT_SECRET_ENV: &str = "BH_CLIENT_SECRET";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file '{path}': {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to parse settings file '{path}': {source}")]
    ParsingFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("No {field} configured; set it in the settings file or via {env}")]
    MissingSecret {
        field: &'static str,
        env: &'static str,
    },

    #[error("{field} is too large")]
    OutOfRange { field: &'static str },

    #[error("Could not determine the configuration directory")]
    ProjectDirectoriesUnavailable,
}

/// Contents of `config.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub credentials: CredentialSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub http: HttpSettings,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSettings {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_cluster")]
    pub cluster: String,
}

impl std::fmt::Debug for CredentialSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSettings")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("cluster", &self.cluster)
            .finish()
    }
}

fn default_cluster() -> String {
    DEFAULT_CLUSTER.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub ttl_minutes: u32,
    pub cache_minutes: u64,
    pub refresh_interval_minutes: u64,
    pub refresh_margin_hours: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_minutes: DEFAULT_SESSION_TTL_MINUTES,
            cache_minutes: 30,
            refresh_interval_minutes: 30,
            refresh_margin_hours: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        let timeouts = HttpTimeouts::default();
        Self {
            connect_timeout_secs: timeouts.connect.as_secs(),
            request_timeout_secs: timeouts.request.as_secs(),
            user_agent: None,
        }
    }
}

impl Settings {
    #[instrument(level = "debug")]
    pub async fn load(path: &Path) -> Result<Self, SettingsError> {
        debug!("Loading settings from: {}", path.display());

        let content = tokio::fs::read_to_string(path)
            .await
            .context("Failed to read settings file")
            .map_err(|e| {
                error!("Failed to read settings file {}: {}", path.display(), e);
                SettingsError::FileReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                }
            })?;

        toml::from_str(&content)
            .context("Failed to parse settings TOML")
            .map_err(|e| {
                error!("Failed to parse settings file {}: {}", path.display(), e);
                SettingsError::ParsingFailed {
                    path: path.to_path_buf(),
                    source: e,
                }
            })
    }

    pub fn default_path() -> Result<PathBuf, SettingsError> {
        let proj_dirs = ProjectDirs::from("com", "bh-keeper", "bh-keeper")
            .ok_or(SettingsError::ProjectDirectoriesUnavailable)?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Secrets from the environment win over the file
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(password) = lookup(PASSWORD_ENV) {
            self.credentials.password = Some(password);
        }
        if let Some(secret) = lookup(CLIENT_SECRET_ENV) {
            self.credentials.client_secret = Some(secret);
        }
        self
    }

    pub fn credentials(&self) -> Result<Credentials, SettingsError> {
        let creds = &self.credentials;
        let password = Zeroizing::new(creds.password.clone().ok_or(SettingsError::MissingSecret {
            field: "password",
            env: PASSWORD_ENV,
        })?);
        let client_secret =
            Zeroizing::new(creds.client_secret.clone().ok_or(SettingsError::MissingSecret {
                field: "client_secret",
                env: CLIENT_SECRET_ENV,
            })?);

        Ok(Credentials::new(
            creds.username.as_str(),
            password.as_str(),
            creds.client_id.as_str(),
            client_secret.as_str(),
        )
        .cluster(creds.cluster.as_str()))
    }

    pub fn auth_config(&self) -> BhAuthConfig {
        BhAuthConfig {
            http_timeouts: HttpTimeouts {
                connect: Duration::from_secs(self.http.connect_timeout_secs),
                request: Duration::from_secs(self.http.request_timeout_secs),
            },
            user_agent: self
                .http
                .user_agent
                .clone()
                .or_else(|| BhAuthConfig::default().user_agent),
            ..BhAuthConfig::default()
        }
    }

    pub fn caching_options(&self) -> Result<CachingOptions, SettingsError> {
        Ok(CachingOptions {
            session_ttl_minutes: self.session.ttl_minutes,
            cache_ttl: seconds(self.session.cache_minutes, 60, "session.cache_minutes")?,
        })
    }

    pub fn managed_options(&self) -> Result<ManagedOptions, SettingsError> {
        Ok(ManagedOptions {
            session_ttl_minutes: self.session.ttl_minutes,
            refresh_margin: seconds(
                self.session.refresh_margin_hours,
                60 * 60,
                "session.refresh_margin_hours",
            )?,
            refresh_interval: seconds(
                self.session.refresh_interval_minutes,
                60,
                "session.refresh_interval_minutes",
            )?,
        })
    }
}

fn seconds(value: u64, unit_secs: u64, field: &'static str) -> Result<Duration, SettingsError> {
    value
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or(SettingsError::OutOfRange { field })
}
