use std::time::Duration;

use bh_auth::{AuthEndpoints, BhAuthConfig, Credentials, TokenAcquirer};
use chrono::{DateTime, Utc};
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn credentials() -> Credentials {
    Credentials::new("apiuser", "s3cret", "cid", "csecret")
}

/// One REST login the mock authority will hand out
pub struct LoginChain {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub times: Option<u64>,
    pub delay: Duration,
}

impl LoginChain {
    pub fn new(token: &str, expires_in: chrono::Duration) -> Self {
        Self {
            token: token.to_string(),
            expires_at: Utc::now() + expires_in,
            times: None,
            delay: Duration::ZERO,
        }
    }

    pub fn times(mut self, times: u64) -> Self {
        self.times = Some(times);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

pub struct MockAuthority {
    pub server: MockServer,
}

impl MockAuthority {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn acquirer(&self) -> TokenAcquirer {
        let base = Url::parse(&self.server.uri()).unwrap();
        TokenAcquirer::new(BhAuthConfig::with_endpoints(
            AuthEndpoints::with_base(&base).unwrap(),
        ))
        .unwrap()
    }

    pub fn rest_url(&self) -> String {
        format!("{}/rest-services/abc/", self.server.uri())
    }

    /// Authorize, token, REST login and ping for one session token
    pub async fn mount_login_chain(&self, chain: LoginChain) {
        Mock::given(method("POST"))
            .and(path("/oauth/authorize"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", "https://app.example/cb?code=abc123"),
            )
            .mount(&self.server)
            .await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(query_param("code", "abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "at-1"})))
            .mount(&self.server)
            .await;

        let login = Mock::given(method("POST"))
            .and(path("/rest-services/login"))
            .and(query_param("access_token", "at-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "BhRestToken": chain.token,
                        "restUrl": self.rest_url(),
                    }))
                    .set_delay(chain.delay),
            );
        let login = match chain.times {
            Some(times) => login.up_to_n_times(times),
            None => login,
        };
        login.mount(&self.server).await;

        Mock::given(method("GET"))
            .and(path("/rest-services/abc/ping"))
            .and(query_param("BhRestToken", chain.token.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sessionExpires": chain.expires_at.timestamp_millis()
            })))
            .mount(&self.server)
            .await;
    }

    /// Authorize endpoint that always fails
    pub async fn mount_broken_authorize(&self, delay: Duration) {
        Mock::given(method("POST"))
            .and(path("/oauth/authorize"))
            .respond_with(ResponseTemplate::new(500).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    pub async fn count(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == request_path)
            .count()
    }

    pub async fn logins(&self) -> usize {
        self.count("/rest-services/login").await
    }

    pub async fn authorize_attempts(&self) -> usize {
        self.count("/oauth/authorize").await
    }
}
