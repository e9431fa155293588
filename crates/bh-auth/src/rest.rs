use chrono::{DateTime, Utc};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::errors::{BhAuthError, Result, StepError};
use crate::probe::SessionExpiryProbe;
use crate::session::Session;

/// A REST call, relative to the session's `restUrl`
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// HTTP handle bound to one REST session
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    session: Session,
}

impl RestClient {
    pub fn new(http: Client, session: Session) -> Self {
        Self { http, session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Send a request with `BhRestToken` attached and return the JSON body
    #[instrument(skip(self, spec), fields(method = %spec.method, path = %spec.path))]
    pub async fn send(&self, spec: RequestSpec) -> Result<Value> {
        let url = self
            .session
            .base_url()
            .join(spec.path.trim_start_matches('/'))?;

        let mut request = self
            .http
            .request(spec.method, url)
            .query(&spec.query)
            .query(&[("BhRestToken", self.session.session_token())]);
        if let Some(body) = &spec.body {
            request = request.json(body);
        }

        debug!("Sending REST request");
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(StepError::from_response(response).await.into());
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| BhAuthError::InvalidResponse(e.to_string()))
    }

    /// Like [`send`](Self::send), decoding into `T`
    pub async fn send_json<T: DeserializeOwned>(&self, spec: RequestSpec) -> Result<T> {
        let value = self.send(spec).await?;
        serde_json::from_value(value).map_err(|e| BhAuthError::InvalidResponse(e.to_string()))
    }

    /// Liveness call; returns the expiry the server currently reports
    pub async fn ping(&self) -> Result<DateTime<Utc>> {
        SessionExpiryProbe::new(self.http.clone())
            .probe_expiry(&self.session)
            .await
    }
}
