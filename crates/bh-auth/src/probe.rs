use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{debug, instrument, warn};

use crate::errors::{Result, StepError};
use crate::models::PingResponse;
use crate::session::Session;

/// Asks the REST API when a session expires
#[derive(Debug, Clone)]
pub struct SessionExpiryProbe {
    http: Client,
}

impl SessionExpiryProbe {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// Absolute expiry reported by the `ping` endpoint
    pub async fn probe_expiry(&self, session: &Session) -> Result<DateTime<Utc>> {
        Ok(self.ping(session).await?)
    }

    /// Like [`probe_expiry`](Self::probe_expiry), but an unreachable or odd ping means "unknown"
    pub async fn probe_expiry_soft(&self, session: &Session) -> Option<DateTime<Utc>> {
        match self.ping(session).await {
            Ok(expires_at) => Some(expires_at),
            Err(e) => {
                warn!("Could not learn session expiry: {}", e);
                None
            }
        }
    }

    #[instrument(skip_all, fields(rest_url = %session.base_url()))]
    pub(crate) async fn ping(&self, session: &Session) -> std::result::Result<DateTime<Utc>, StepError> {
        let url = session.base_url().join("ping")?;

        debug!("Pinging REST session");
        let response = self
            .http
            .get(url)
            .query(&[("BhRestToken", session.session_token())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StepError::from_response(response).await);
        }

        let body = response.text().await?;
        let ping: PingResponse =
            serde_json::from_str(&body).map_err(|e| StepError::Malformed(e.to_string()))?;
        let millis = ping
            .session_expires
            .ok_or(StepError::MissingField("sessionExpires"))?;

        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| StepError::Malformed(format!("sessionExpires out of range: {millis}")))
    }
}
