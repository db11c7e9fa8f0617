// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: builders, fixtures, and assertion helpers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::credential::{Credential, ProviderConfig};
use crate::gateway::{ToolGateway, SESSION_CACHE_TTL};
use crate::invoke::{InvokeConfig, RetryPolicy, ToolClient};
use crate::registry::{AccountRegistry, RegistryConfig};
use crate::selector::SelectionSettings;
use crate::state::GateState;
use crate::store::{KvStore, MemoryStore, StoreFuture};

/// Client id of the provider built by [`provider_at`].
pub const TEST_CLIENT_ID: &str = "test-client";

/// Token-exchange provider whose token and identity endpoints live under `base`.
pub fn provider_at(base: &str) -> ProviderConfig {
    let base = base.trim_end_matches('/');
    let mut provider =
        ProviderConfig::notion(TEST_CLIENT_ID, "test-secret", "http://localhost:3001/oauth/callback");
    provider.token_url = format!("{base}/v1/oauth/token");
    provider.identity_url = Some(format!("{base}/v1/users/me"));
    provider
}

/// Builder for an [`AccountRegistry`] over an in-memory store.
pub struct RegistryBuilder {
    providers: Vec<ProviderConfig>,
    config: RegistryConfig,
    store: Arc<dyn KvStore>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            providers: vec![provider_at("http://127.0.0.1:9"), ProviderConfig::notion_mcp()],
            config: RegistryConfig::default(),
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// Point the token-exchange provider at a mock server.
    pub fn provider_base(mut self, base: &str) -> Self {
        self.providers[0] = provider_at(base);
        self
    }

    pub fn providers(mut self, providers: Vec<ProviderConfig>) -> Self {
        self.providers = providers;
        self
    }

    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.config.session_ttl = ttl;
        self
    }

    pub fn single_account(mut self, enabled: bool) -> Self {
        self.config.single_account = enabled;
        self
    }

    pub fn selection(mut self, settings: SelectionSettings) -> Self {
        self.config.selection = settings;
        self
    }

    pub fn store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = store;
        self
    }

    pub fn build(self) -> Arc<AccountRegistry> {
        let (event_tx, _) = broadcast::channel(64);
        AccountRegistry::new(self.store, self.providers, self.config, event_tx)
    }
}

/// Tool client for `base` with millisecond retry delays.
pub fn fast_tool_client(base: &str) -> Arc<ToolClient> {
    let mut config = InvokeConfig::new(base);
    config.retry = RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
    };
    Arc::new(ToolClient::new(config))
}

/// Shared state wiring `registry` to a gateway over `tool_base`.
pub fn gate_state(
    registry: Arc<AccountRegistry>,
    tool_base: &str,
    auth_token: Option<&str>,
) -> Arc<GateState> {
    let gateway = ToolGateway::new(Arc::clone(&registry), fast_tool_client(tool_base), SESSION_CACHE_TTL);
    gateway.spawn_invalidator(registry.subscribe());
    Arc::new(GateState::new(
        registry,
        gateway,
        auth_token.map(str::to_owned),
        CancellationToken::new(),
    ))
}

/// Seed a pre-authorized account and return its id.
pub async fn seed(
    registry: &AccountRegistry,
    tenant: &str,
    name: &str,
    token: &str,
) -> anyhow::Result<String> {
    Ok(registry.seed_account(tenant, "notion-mcp", name, Credential::bearer(token)).await?)
}

/// Assert that a `Result` is `Err` and its display string
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}

/// Memory store whose credential reads stall for `delay`.
pub struct SlowCredentialReads {
    inner: MemoryStore,
    delay: Duration,
}

impl SlowCredentialReads {
    pub fn new(delay: Duration) -> Self {
        Self { inner: MemoryStore::new(), delay }
    }
}

impl KvStore for SlowCredentialReads {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            if key.starts_with("oauth:token:") {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.get(key).await
        })
    }

    fn put<'a>(&'a self, key: &'a str, value: String, ttl: Option<Duration>) -> StoreFuture<'a, ()> {
        self.inner.put(key, value, ttl)
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        self.inner.delete(key)
    }

    fn take<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        self.inner.take(key)
    }

    fn keys<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
        self.inner.keys(prefix)
    }

    fn purge_expired(&self) -> StoreFuture<'_, usize> {
        self.inner.purge_expired()
    }
}
