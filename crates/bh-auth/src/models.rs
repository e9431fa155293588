use serde::Deserialize;

/// OAuth token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct AccessTokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
}

/// REST login response
#[derive(Debug, Clone, Deserialize)]
pub struct RestLoginResponse {
    #[serde(rename = "BhRestToken", default)]
    pub bh_rest_token: Option<String>,
    #[serde(rename = "restUrl", default)]
    pub rest_url: Option<String>,
}

/// Ping response, `sessionExpires` is epoch milliseconds
#[derive(Debug, Clone, Deserialize)]
pub struct PingResponse {
    #[serde(rename = "sessionExpires", default)]
    pub session_expires: Option<i64>,
}
