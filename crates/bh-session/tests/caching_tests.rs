mod common;

use std::time::Duration;

use bh_auth::{AuthStep, BhAuthError, RequestSpec};
use bh_session::{CachingOptions, CachingSessionClient};
use common::{credentials, LoginChain, MockAuthority};
use serde_json::json;
use tokio::task::JoinSet;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

fn caching_client(authority: &MockAuthority, cache_ttl: Duration) -> CachingSessionClient {
    CachingSessionClient::with_options(
        authority.acquirer(),
        credentials(),
        CachingOptions {
            cache_ttl,
            ..CachingOptions::default()
        },
    )
}

#[tokio::test]
async fn test_concurrent_misses_share_one_login() {
    let authority = MockAuthority::start().await;
    authority
        .mount_login_chain(LoginChain::new("bh-1", chrono::Duration::hours(48)).delay(Duration::from_millis(200)))
        .await;

    let client = caching_client(&authority, Duration::from_secs(1800));

    let mut callers = JoinSet::new();
    for _ in 0..16 {
        let client = client.clone();
        callers.spawn(async move { client.get_client().await });
    }

    let mut tokens = Vec::new();
    while let Some(joined) = callers.join_next().await {
        let rest = joined.unwrap().unwrap();
        tokens.push(rest.session().session_token().to_string());
    }

    assert_eq!(tokens.len(), 16);
    assert!(tokens.iter().all(|token| token == "bh-1"));
    assert_eq!(authority.authorize_attempts().await, 1);
    assert_eq!(authority.logins().await, 1);
}

#[tokio::test]
async fn test_concurrent_misses_share_one_failure_then_retry() {
    let authority = MockAuthority::start().await;
    authority.mount_broken_authorize(Duration::from_millis(200)).await;

    let client = caching_client(&authority, Duration::from_secs(1800));

    let mut callers = JoinSet::new();
    for _ in 0..8 {
        let client = client.clone();
        callers.spawn(async move { client.get_client().await });
    }

    while let Some(joined) = callers.join_next().await {
        let err = joined.unwrap().unwrap_err();
        assert_eq!(err.step(), Some(AuthStep::AuthorizationCode));
    }
    assert_eq!(authority.authorize_attempts().await, 1);
    assert!(client.cached_session().is_none());

    // The failed attempt is gone; the next call starts over
    let err = client.get_client().await.unwrap_err();
    assert!(matches!(err, BhAuthError::Auth { .. }));
    assert_eq!(authority.authorize_attempts().await, 2);
}

#[tokio::test]
async fn test_cached_session_reused_without_network() {
    let authority = MockAuthority::start().await;
    authority
        .mount_login_chain(LoginChain::new("bh-1", chrono::Duration::hours(48)))
        .await;

    let client = caching_client(&authority, Duration::from_secs(1800));

    let first = client.get_client().await.unwrap();
    let second = client.get_client().await.unwrap();

    assert_eq!(first.session(), second.session());
    assert_eq!(authority.logins().await, 1);
    assert_eq!(client.cached_session().as_ref(), Some(first.session()));
}

#[tokio::test]
async fn test_expired_entry_triggers_new_login() {
    let authority = MockAuthority::start().await;
    authority
        .mount_login_chain(LoginChain::new("bh-1", chrono::Duration::hours(48)).times(1))
        .await;
    authority
        .mount_login_chain(LoginChain::new("bh-2", chrono::Duration::hours(48)))
        .await;

    // Zero TTL: every call lands at or after valid_until
    let client = caching_client(&authority, Duration::ZERO);

    let first = client.get_client().await.unwrap();
    let second = client.get_client().await.unwrap();

    assert_eq!(first.session().session_token(), "bh-1");
    assert_eq!(second.session().session_token(), "bh-2");
    assert_eq!(authority.logins().await, 2);
}

#[tokio::test]
async fn test_invalidate_forces_login() {
    let authority = MockAuthority::start().await;
    authority
        .mount_login_chain(LoginChain::new("bh-1", chrono::Duration::hours(48)))
        .await;

    let client = caching_client(&authority, Duration::from_secs(1800));
    client.get_client().await.unwrap();
    client.invalidate();
    client.get_client().await.unwrap();

    assert_eq!(authority.logins().await, 2);
}

#[tokio::test]
async fn test_client_sends_requests_with_cached_token() {
    let authority = MockAuthority::start().await;
    authority
        .mount_login_chain(LoginChain::new("bh-1", chrono::Duration::hours(48)))
        .await;
    Mock::given(method("GET"))
        .and(path("/rest-services/abc/entity/JobOrder/7"))
        .and(query_param("BhRestToken", "bh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"id": 7}})))
        .expect(2)
        .mount(&authority.server)
        .await;

    let client = CachingSessionClient::new(authority.acquirer(), credentials());
    for _ in 0..2 {
        let body = client
            .get_client()
            .await
            .unwrap()
            .send(RequestSpec::get("entity/JobOrder/7"))
            .await
            .unwrap();
        assert_eq!(body["data"]["id"], 7);
    }
    assert_eq!(authority.logins().await, 1);
}
