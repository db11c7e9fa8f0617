// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::test_support::{fast_tool_client, seed, RegistryBuilder, SlowCredentialReads};

const SEARCH: &str = "mcp_notionApi_API-post-search";

async fn tool_endpoint() -> MockServer {
    let server = MockServer::start().await;
    for token in ["t-home", "t-work"] {
        Mock::given(method("POST"))
            .and(path("/mcp/execute"))
            .and(body_partial_json(serde_json::json!({ "auth": { "token": token } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": { "token_used": token },
            })))
            .mount(&server)
            .await;
    }
    server
}

#[test]
fn catalog_hash_ignores_order() {
    let a = catalog_hash(&["x".to_owned(), "y".to_owned()]);
    let b = catalog_hash(&["y".to_owned(), "x".to_owned()]);
    let c = catalog_hash(&["x".to_owned()]);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.len(), 16);
}

#[tokio::test]
async fn gateway_uses_active_credential() -> anyhow::Result<()> {
    let server = tool_endpoint().await;
    let registry = RegistryBuilder::new().build();
    seed(&registry, "u1", "Home", "t-home").await?;
    let gateway = ToolGateway::new(Arc::clone(&registry), fast_tool_client(&server.uri()), SESSION_CACHE_TTL);

    let (session, value) = gateway.invoke("u1", SEARCH, &serde_json::json!({})).await?;
    assert_eq!(value, serde_json::json!({ "token_used": "t-home" }));
    assert_eq!(session.account_name, "Home");
    Ok(())
}

#[tokio::test]
async fn sessions_are_cached_per_tenant() -> anyhow::Result<()> {
    let server = tool_endpoint().await;
    let registry = RegistryBuilder::new().build();
    seed(&registry, "u1", "Home", "t-home").await?;
    seed(&registry, "u2", "Work", "t-work").await?;
    let gateway = ToolGateway::new(Arc::clone(&registry), fast_tool_client(&server.uri()), SESSION_CACHE_TTL);

    let first = gateway.session("u1").await?;
    let again = gateway.session("u1").await?;
    let other = gateway.session("u2").await?;
    assert!(Arc::ptr_eq(&first, &again));
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(gateway.cached_sessions().await, 2);

    assert_eq!(gateway.invalidate("u1").await, 1);
    let rebuilt = gateway.session("u1").await?;
    assert!(!Arc::ptr_eq(&first, &rebuilt));
    Ok(())
}

#[tokio::test]
async fn expired_sessions_are_rebuilt() -> anyhow::Result<()> {
    let registry = RegistryBuilder::new().build();
    seed(&registry, "u1", "Home", "t-home").await?;
    let gateway = ToolGateway::new(Arc::clone(&registry), fast_tool_client("http://127.0.0.1:9"), Duration::ZERO);

    let first = gateway.session("u1").await?;
    let second = gateway.session("u1").await?;
    assert!(!Arc::ptr_eq(&first, &second));
    Ok(())
}

#[tokio::test]
async fn account_switch_invalidates_cached_session() -> anyhow::Result<()> {
    let server = tool_endpoint().await;
    let registry = RegistryBuilder::new().build();
    seed(&registry, "u1", "Home", "t-home").await?;
    let work = seed(&registry, "u1", "Work", "t-work").await?;
    let gateway = ToolGateway::new(Arc::clone(&registry), fast_tool_client(&server.uri()), SESSION_CACHE_TTL);
    gateway.spawn_invalidator(registry.subscribe());

    let (_, before) = gateway.invoke("u1", SEARCH, &serde_json::json!({})).await?;
    assert_eq!(before["token_used"], "t-home");

    registry.switch_account("u1", &work).await?;
    for _ in 0..50 {
        if gateway.cached_sessions().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let (session, after) = gateway.invoke("u1", SEARCH, &serde_json::json!({})).await?;
    assert_eq!(after["token_used"], "t-work");
    assert_eq!(session.account_id, work);
    Ok(())
}

#[tokio::test]
async fn tenant_without_accounts_cannot_invoke() -> anyhow::Result<()> {
    let registry = RegistryBuilder::new().build();
    let gateway = ToolGateway::new(registry, fast_tool_client("http://127.0.0.1:9"), SESSION_CACHE_TTL);

    let err = gateway
        .invoke("nobody", SEARCH, &serde_json::json!({}))
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected failure"))?;
    assert!(matches!(err, GatewayError::Auth(AuthError::NoActiveAccount)));
    assert_eq!(err.code(), GateError::NoActiveAccount);
    Ok(())
}

#[test]
fn cache_purges_and_invalidates_by_tenant() {
    let mut cache = SessionCache::new(SESSION_CACHE_TTL);
    assert!(cache.is_empty());
    assert_eq!(cache.invalidate_tenant("u1"), 0);
    assert_eq!(cache.purge_expired(), 0);
}

fn cached_session(tenant: &str) -> (SessionKey, Arc<ToolSession>) {
    let key = SessionKey { tenant: tenant.to_owned(), catalog: "c".to_owned() };
    let session = Arc::new(ToolSession {
        tenant: tenant.to_owned(),
        account_id: "a-1".to_owned(),
        account_name: "Home".to_owned(),
        credential: Credential::bearer("t-home"),
        client: fast_tool_client("http://127.0.0.1:9"),
        created_at: Instant::now(),
    });
    (key, session)
}

#[test]
fn sessions_built_before_invalidation_are_not_cached() {
    let mut cache = SessionCache::new(SESSION_CACHE_TTL);
    let (key, session) = cached_session("u1");

    let stale = cache.generation("u1");
    let untouched = cache.generation("u2");
    cache.invalidate_tenant("u1");
    assert!(!cache.insert_if_current(key.clone(), Arc::clone(&session), stale));
    assert!(cache.get(&key).is_none());
    assert_eq!(cache.generation("u2"), untouched);

    let current = cache.generation("u1");
    assert!(cache.insert_if_current(key.clone(), Arc::clone(&session), current));
    assert_eq!(cache.len(), 1);

    let before_clear = cache.generation("u1");
    cache.clear();
    assert!(cache.is_empty());
    assert!(!cache.insert_if_current(key, session, before_clear));
    assert!(cache.is_empty());
}

#[tokio::test]
async fn switch_during_session_build_is_not_cached() -> anyhow::Result<()> {
    let server = tool_endpoint().await;
    let store: Arc<dyn crate::store::KvStore> = Arc::new(SlowCredentialReads::new(Duration::from_millis(200)));
    let registry = RegistryBuilder::new().store(store).build();
    seed(&registry, "u1", "Home", "t-home").await?;
    let work = seed(&registry, "u1", "Work", "t-work").await?;
    let gateway = ToolGateway::new(Arc::clone(&registry), fast_tool_client(&server.uri()), SESSION_CACHE_TTL);
    gateway.spawn_invalidator(registry.subscribe());

    let building = {
        let gateway = Arc::clone(&gateway);
        tokio::spawn(async move { gateway.session("u1").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    registry.switch_account("u1", &work).await?;

    let stale = building.await??;
    assert_eq!(stale.account_name, "Home");
    assert_eq!(gateway.cached_sessions().await, 0);

    let (session, value) = gateway.invoke("u1", SEARCH, &serde_json::json!({})).await?;
    assert_eq!(session.account_id, work);
    assert_eq!(value["token_used"], "t-work");
    Ok(())
}
