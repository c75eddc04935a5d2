mod support;

use anyhow::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use dify_knowledge::{
    cache::{CacheStore, MemoryCache},
    client::Config,
    error::{self, ErrorKind},
    http::{HttpRequest, HttpResponse, StatusCode, Transport},
    session::{AuthMode, Session, SessionConfig, SessionState},
    Client,
};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use support::{console_client, FakeDify, BASE_URL, EMAIL, PASSWORD};

fn memory_cache() -> Arc<dyn CacheStore> {
    Arc::new(MemoryCache::new())
}

#[tokio::test]
async fn test_login_round_trip() -> Result<()> {
    let fake = FakeDify::new();
    let cache = memory_cache();
    let client = console_client(&fake, PASSWORD, cache.clone());
    let console = client.console()?;
    let session = console.session();
    assert_eq!(session.state(), SessionState::Unauthenticated);

    let login = console.login().await?;
    let pair = login.tokens().expect("login tokens").clone();
    assert_eq!(session.state(), SessionState::Authenticated);
    assert_eq!(session.token().await, Some(pair.access_token.clone()));
    assert_eq!(
        session.tokens().access_token().await,
        Some(pair.access_token.clone())
    );
    assert_eq!(session.refresh_token_value().await, pair.refresh_token.clone());
    assert!(cache.has("access_token").await);
    assert!(cache.has("refresh_token").await);

    let login_request = &fake.requests()[0];
    assert_eq!(login_request.path, "/console/api/login");
    assert_eq!(login_request.bearer, None);

    assert!(session.clear_tokens().await);
    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert!(!cache.has("access_token").await);
    assert!(!cache.has("refresh_token").await);
    // clearing again still succeeds
    assert!(session.clear_tokens().await);
    Ok(())
}

#[tokio::test]
async fn test_first_request_logs_in_on_demand() -> Result<()> {
    let fake = FakeDify::new();
    fake.seed_datasets(2);
    let client = console_client(&fake, PASSWORD, memory_cache());

    let page = client.console()?.datasets().list(1, 20).await?;
    assert_eq!(page.len(), 2);
    assert_eq!(fake.logins(), 1);

    let requests = fake.resource_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].bearer, None);
    assert!(requests[1].bearer.is_some());
    assert_eq!(requests[1].path, "/console/api/datasets");
    Ok(())
}

#[tokio::test]
async fn test_stale_access_token_is_refreshed_once() -> Result<()> {
    let fake = FakeDify::new();
    fake.seed_datasets(3);
    let client = console_client(&fake, PASSWORD, memory_cache());
    let console = client.console()?;
    console.login().await?;
    let stale = console.session().token().await;

    fake.expire_access_tokens();
    let page = console.datasets().list(1, 20).await?;

    assert_eq!(page.len(), 3);
    assert_eq!(fake.refreshes(), 1);
    assert_eq!(fake.logins(), 1);
    assert_eq!(fake.resource_requests().len(), 2);
    let fresh = console.session().token().await;
    assert!(fresh.is_some());
    assert_ne!(fresh, stale);
    assert_eq!(console.session().tokens().access_token().await, fresh);
    assert_eq!(console.session().state(), SessionState::Authenticated);
    Ok(())
}

#[tokio::test]
async fn test_rejected_refresh_falls_back_to_login() -> Result<()> {
    let fake = FakeDify::new();
    fake.seed_datasets(1);
    let client = console_client(&fake, PASSWORD, memory_cache());
    let console = client.console()?;
    console.login().await?;
    let old_refresh = console.session().refresh_token_value().await;

    fake.expire_access_tokens();
    fake.revoke_refresh_tokens();
    let page = console.datasets().list(1, 20).await?;

    assert_eq!(page.len(), 1);
    assert_eq!(fake.refreshes(), 0);
    assert_eq!(fake.logins(), 2);
    let new_refresh = console.session().refresh_token_value().await;
    assert!(new_refresh.is_some());
    assert_ne!(new_refresh, old_refresh);
    Ok(())
}

#[tokio::test]
async fn test_invalid_credentials_store_nothing() -> Result<()> {
    let fake = FakeDify::new();
    let cache = memory_cache();
    let client = console_client(&fake, "wrong-password", cache.clone());
    let console = client.console()?;

    let err = console.login().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert!(!cache.has("access_token").await);
    assert!(!cache.has("refresh_token").await);
    assert_eq!(console.session().state(), SessionState::Unauthenticated);

    // a request fails the same way, after exactly one attempt
    let err = console.datasets().list(1, 20).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert_eq!(fake.resource_requests().len(), 1);
    assert!(!cache.has("access_token").await);
    Ok(())
}

#[tokio::test]
async fn test_failed_fallback_login_clears_stored_tokens() -> Result<()> {
    let fake = FakeDify::new();
    let cache = memory_cache();
    let good = console_client(&fake, PASSWORD, cache.clone());
    good.console()?.login().await?;
    assert!(cache.has("access_token").await);
    assert!(cache.has("refresh_token").await);

    fake.expire_access_tokens();
    fake.revoke_refresh_tokens();
    let bad = console_client(&fake, "wrong-password", cache.clone());
    let console = bad.console()?;
    let err = console.datasets().list(1, 20).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert!(!cache.has("access_token").await);
    assert!(!cache.has("refresh_token").await);
    assert_eq!(console.session().state(), SessionState::Unauthenticated);
    assert_eq!(fake.logins(), 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_refresh_token_goes_straight_to_login() -> Result<()> {
    let fake = FakeDify::new();
    fake.seed_datasets(1);
    let cache = memory_cache();
    let client = console_client(&fake, PASSWORD, cache.clone());
    let console = client.console()?;
    console.login().await?;

    assert!(cache.delete("refresh_token").await);
    fake.expire_access_tokens();
    let page = console.datasets().list(1, 20).await?;

    assert_eq!(page.len(), 1);
    assert_eq!(fake.logins(), 2);
    let refresh_calls = fake
        .requests()
        .iter()
        .filter(|r| r.path.ends_with("/oauth/token/refresh"))
        .count();
    assert_eq!(refresh_calls, 0);
    assert!(cache.has("refresh_token").await);
    Ok(())
}

/// Rejects every resource call and never answers a login.
struct StalledLogin;

#[async_trait]
impl Transport for StalledLogin {
    async fn execute(&self, request: HttpRequest) -> error::Result<HttpResponse> {
        if request.url.ends_with("/login") {
            futures::future::pending::<()>().await;
        }
        Ok(HttpResponse::new(
            StatusCode::UNAUTHORIZED,
            r#"{"code":"unauthorized","message":"Access token is invalid","status":401}"#,
        ))
    }
}

#[tokio::test]
async fn test_cancelled_recovery_resets_refreshing_state() -> Result<()> {
    let session = Session::new(
        SessionConfig::new(BASE_URL, AuthMode::login(EMAIL, PASSWORD)),
        Arc::new(StalledLogin),
        memory_cache(),
    );

    {
        let request = session.get::<JsonValue>("/datasets", &[]);
        futures::pin_mut!(request);
        assert!(futures::poll!(request.as_mut()).is_pending());
        assert_eq!(session.state(), SessionState::Refreshing);
    }

    assert_eq!(session.state(), SessionState::Unauthenticated);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() -> Result<()> {
    let fake = FakeDify::new();
    fake.seed_datasets(6);
    let client = console_client(&fake, PASSWORD, memory_cache());
    let console = client.console()?;
    console.login().await?;
    fake.expire_access_tokens();

    let datasets = console.datasets();
    let (a, b, c) = tokio::join!(
        datasets.list(1, 2),
        datasets.list(2, 2),
        datasets.list(3, 2)
    );
    assert_eq!(a?.len(), 2);
    assert_eq!(b?.len(), 2);
    assert_eq!(c?.len(), 2);
    assert_eq!(fake.refreshes(), 1);
    assert_eq!(fake.logins(), 1);
    Ok(())
}

#[tokio::test]
async fn test_restore_reuses_cached_token() -> Result<()> {
    let fake = FakeDify::new();
    fake.seed_datasets(1);
    let cache = memory_cache();

    let first = console_client(&fake, PASSWORD, cache.clone());
    first.console()?.login().await?;

    let second = console_client(&fake, PASSWORD, cache.clone());
    let console = second.console()?;
    assert!(console.session().restore().await);
    assert_eq!(console.session().state(), SessionState::Authenticated);

    console.datasets().list(1, 20).await?;
    assert_eq!(fake.logins(), 1);
    assert_eq!(fake.refreshes(), 0);
    Ok(())
}

#[tokio::test]
async fn test_api_key_401_is_not_recovered() -> Result<()> {
    let fake = FakeDify::new();
    let config = Config {
        base_url: BASE_URL.into(),
        api_key: "revoked-key".into(),
        ..Config::default()
    };
    let client = Client::with_transport(config, fake.clone(), memory_cache());

    let err = client.datasets().list(1, 20).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert_eq!(err.status(), Some(401));
    assert_eq!(fake.requests().len(), 1);
    assert_eq!(fake.logins(), 0);

    let err = client.session().login().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConfigured);
    Ok(())
}

#[tokio::test]
async fn test_injected_tokens_and_expiry() -> Result<()> {
    let fake = FakeDify::new();
    let client = console_client(&fake, PASSWORD, memory_cache());
    let session = client.console()?.session();

    assert!(session.is_token_expired().await);

    let exp = chrono::Utc::now().timestamp() + 3600;
    let payload = URL_SAFE_NO_PAD.encode(json!({ "exp": exp }).to_string());
    let jwt = format!("e30.{}.sig", payload);
    assert!(session.set_tokens(&jwt, Some("refresh-injected")).await);
    assert_eq!(session.token().await.as_deref(), Some(jwt.as_str()));
    assert!(!session.is_token_expired().await);

    assert!(session.set_tokens("opaque-token", None).await);
    assert!(session.is_token_expired().await);
    assert_eq!(
        session.refresh_token_value().await.as_deref(),
        Some("refresh-injected")
    );
    assert!(fake.requests().is_empty());
    Ok(())
}
