use reqwest::{redirect, Client, Response, StatusCode};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::{AuthEndpoints, BhAuthConfig};
use crate::errors::{AuthStep, BhAuthError, Result, StepError};
use crate::models::{AccessTokenResponse, RestLoginResponse};
use crate::probe::SessionExpiryProbe;
use crate::session::{Credentials, Session};

type StepResult<T> = std::result::Result<T, StepError>;

/// Authorization code plus the token endpoint of the authority that issued it
#[derive(Debug)]
struct AuthCode {
    code: String,
    token_url: Url,
}

/// Runs the Bullhorn login chain: credentials, auth code, access token, REST session
#[derive(Debug, Clone)]
pub struct TokenAcquirer {
    config: BhAuthConfig,
    http: Client,
}

impl TokenAcquirer {
    /// Create a new acquirer; its HTTP client never follows redirects
    pub fn new(config: BhAuthConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .timeout(config.http_timeouts.request)
            .user_agent(config.user_agent.as_deref().unwrap_or("bh-keeper"))
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self { config, http })
    }

    /// The HTTP client shared with REST handles created from acquired sessions
    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn probe(&self) -> SessionExpiryProbe {
        SessionExpiryProbe::new(self.http.clone())
    }

    /// Page a human must open once to accept the API terms for this client id
    pub fn authorize_url(&self, credentials: &Credentials) -> Result<Url> {
        let endpoints = self.config.endpoints_for(&credentials.cluster)?;
        Ok(with_authorize_params(
            endpoints.authorize,
            &credentials.client_id,
        ))
    }

    /// Acquire a REST session without learning its expiry
    #[instrument(skip(self, credentials), fields(username = %credentials.username, cluster = %credentials.cluster))]
    pub async fn acquire(&self, credentials: &Credentials, ttl_minutes: u32) -> Result<Session> {
        let endpoints = self.config.endpoints_for(&credentials.cluster)?;
        let consent_url = with_authorize_params(endpoints.authorize.clone(), &credentials.client_id);
        let fail = |step: AuthStep| {
            let consent_url = consent_url.to_string();
            move |cause: StepError| BhAuthError::Auth {
                step,
                cause,
                consent_url,
            }
        };

        debug!("Starting REST login chain");

        // Step 1: Trade credentials for an authorization code
        let auth_code = self
            .fetch_auth_code(&endpoints, credentials)
            .await
            .map_err(fail(AuthStep::AuthorizationCode))?;

        // Step 2: Trade the code for an access token
        let access_token = self
            .fetch_access_token(&auth_code, credentials)
            .await
            .map_err(fail(AuthStep::AccessToken))?;

        // Step 3: Open a REST session
        let session = self
            .fetch_rest_session(&endpoints.rest_login, &access_token, ttl_minutes)
            .await
            .map_err(fail(AuthStep::RestLogin))?;

        info!(rest_url = %session.base_url(), "REST session acquired");
        Ok(session)
    }

    /// Acquire a REST session and ask the authority when it expires
    ///
    /// Unlike [`acquire`](Self::acquire), a failing expiry probe fails the whole call.
    #[instrument(skip(self, credentials), fields(username = %credentials.username))]
    pub async fn acquire_with_expiry(
        &self,
        credentials: &Credentials,
        ttl_minutes: u32,
    ) -> Result<Session> {
        let session = self.acquire(credentials, ttl_minutes).await?;

        match self.probe().ping(&session).await {
            Ok(expires_at) => {
                debug!(%expires_at, "Session expiry learned");
                Ok(session.with_expiry(expires_at))
            }
            Err(cause) => Err(BhAuthError::Auth {
                step: AuthStep::ExpiryProbe,
                cause,
                consent_url: self.authorize_url(credentials)?.to_string(),
            }),
        }
    }

    #[instrument(skip_all)]
    async fn fetch_auth_code(
        &self,
        endpoints: &AuthEndpoints,
        credentials: &Credentials,
    ) -> StepResult<AuthCode> {
        let authorize_url = with_authorize_params(endpoints.authorize.clone(), &credentials.client_id);
        let form = [
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
            ("action", "Login"),
        ];

        debug!("Requesting authorization code");
        let response = self
            .http
            .post(authorize_url.clone())
            .form(&form)
            .send()
            .await?;

        // Handle the wrong-cluster redirect: one re-submit at the corrected authority
        let (response, authority) = if response.status() == StatusCode::TEMPORARY_REDIRECT {
            let corrected = with_authorize_params(
                redirect_target(&authorize_url, response).await?,
                &credentials.client_id,
            );
            warn!(
                authority = corrected.host_str().unwrap_or_default(),
                "Account lives on another cluster, re-submitting credentials there"
            );

            let retry_response = self
                .http
                .post(corrected.clone())
                .form(&form)
                .send()
                .await?;
            (retry_response, corrected)
        } else {
            (response, authorize_url)
        };

        let location = redirect_target(&authority, response).await?;
        let code = location
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned())
            .filter(|code| !code.is_empty())
            .ok_or(StepError::MissingCode)?;

        let token_url = if authority.origin() == endpoints.authorize.origin() {
            endpoints.token.clone()
        } else {
            rebase(&endpoints.token, &authority)?
        };

        Ok(AuthCode { code, token_url })
    }

    #[instrument(skip_all)]
    async fn fetch_access_token(
        &self,
        auth_code: &AuthCode,
        credentials: &Credentials,
    ) -> StepResult<String> {
        debug!(token_url = %auth_code.token_url, "Exchanging authorization code for access token");
        let response = self
            .http
            .post(auth_code.token_url.clone())
            .query(&[
                ("grant_type", "authorization_code"),
                ("code", auth_code.code.as_str()),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
            ])
            .send()
            .await?;

        let token_response: AccessTokenResponse = read_json(response).await?;
        token_response
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or(StepError::MissingField("access_token"))
    }

    #[instrument(skip_all)]
    async fn fetch_rest_session(
        &self,
        rest_login: &Url,
        access_token: &str,
        ttl_minutes: u32,
    ) -> StepResult<Session> {
        debug!(ttl_minutes, "Opening REST session");
        let ttl = ttl_minutes.to_string();
        let response = self
            .http
            .post(rest_login.clone())
            .query(&[
                ("version", "*"),
                ("access_token", access_token),
                ("ttl", ttl.as_str()),
            ])
            .send()
            .await?;

        let login: RestLoginResponse = read_json(response).await?;
        let token = login.bh_rest_token.ok_or(StepError::MissingField("BhRestToken"))?;
        let rest_url = login.rest_url.ok_or(StepError::MissingField("restUrl"))?;

        Session::new(&rest_url, token).map_err(|e| StepError::Malformed(e.to_string()))
    }
}

/// Add `client_id` and `response_type=code` unless the URL already carries them
fn with_authorize_params(mut url: Url, client_id: &str) -> Url {
    let has = |name: &str| url.query_pairs().any(|(key, _)| key == name);
    let missing_client = !has("client_id");
    let missing_type = !has("response_type");

    if missing_client || missing_type {
        let mut pairs = url.query_pairs_mut();
        if missing_client {
            pairs.append_pair("client_id", client_id);
        }
        if missing_type {
            pairs.append_pair("response_type", "code");
        }
    }
    url
}

/// Resolve the `Location` of a redirect the client was told not to follow
async fn redirect_target(request_url: &Url, response: Response) -> StepResult<Url> {
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        return Err(StepError::from_response(response).await);
    }

    let Some(location) = response.headers().get(reqwest::header::LOCATION) else {
        // Usually the login form rendered again, e.g. terms not yet accepted
        return Err(if status.is_redirection() {
            StepError::MissingCode
        } else {
            StepError::NotRedirected(status)
        });
    };

    let location = location
        .to_str()
        .map_err(|e| StepError::Malformed(format!("Location header: {e}")))?;
    Ok(request_url.join(location)?)
}

/// Same path, other authority
fn rebase(endpoint: &Url, authority: &Url) -> StepResult<Url> {
    let origin = authority.origin().ascii_serialization();
    Ok(Url::parse(&format!("{origin}{}", endpoint.path()))?)
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> StepResult<T> {
    if !response.status().is_success() {
        return Err(StepError::from_response(response).await);
    }

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| StepError::Malformed(e.to_string()))
}
