// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool gateway: per-tenant tool sessions bound to the active account.
//!
//! A [`ToolSession`] pairs the tenant's active credential with the shared
//! [`ToolClient`]. Sessions are cached by (tenant, tool catalog hash) for
//! [`SESSION_CACHE_TTL`]; expired entries are purged on access and every
//! entry of a tenant is dropped when the registry reports an account
//! change for it. A session built across such a drop is returned to its
//! caller but not cached.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::{broadcast, Mutex};

use crate::credential::Credential;
use crate::error::{AuthError, GateError};
use crate::invoke::{InvokeFailure, ToolClient};
use crate::registry::{AccountEvent, AccountRegistry};

/// Lifetime of a cached tool session (1 hour).
pub const SESSION_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Failure of a gateway call.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Invoke(#[from] InvokeFailure),
}

impl GatewayError {
    pub fn code(&self) -> GateError {
        match self {
            Self::Auth(e) => e.code(),
            Self::Invoke(e) => e.code(),
        }
    }
}

/// Cache key: the tenant plus the hash of the tool catalog the session was
/// built for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub tenant: String,
    pub catalog: String,
}

/// Tool access bound to one account.
pub struct ToolSession {
    pub tenant: String,
    pub account_id: String,
    pub account_name: String,
    credential: Credential,
    client: Arc<ToolClient>,
    created_at: Instant,
}

impl ToolSession {
    pub async fn execute(&self, tool: &str, arguments: &Value) -> Result<Value, InvokeFailure> {
        self.client.execute(tool, arguments, &self.credential).await
    }

    fn is_stale(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl || self.credential.is_expired()
    }
}

/// TTL cache of tool sessions, oldest first.
pub struct SessionCache {
    map: IndexMap<SessionKey, Arc<ToolSession>>,
    ttl: Duration,
    /// Invalidation count per tenant.
    generations: HashMap<String, u64>,
    /// Full clears.
    epoch: u64,
}

impl SessionCache {
    pub fn new(ttl: Duration) -> Self {
        Self { map: IndexMap::new(), ttl, generations: HashMap::new(), epoch: 0 }
    }

    /// Changes whenever `tenant`'s sessions are invalidated.
    pub fn generation(&self, tenant: &str) -> u64 {
        self.epoch + self.generations.get(tenant).copied().unwrap_or(0)
    }

    pub fn get(&mut self, key: &SessionKey) -> Option<Arc<ToolSession>> {
        self.purge_expired();
        self.map.get(key).cloned()
    }

    pub fn insert(&mut self, key: SessionKey, session: Arc<ToolSession>) {
        self.map.shift_remove(&key);
        self.map.insert(key, session);
    }

    /// Insert unless `key`'s tenant was invalidated since `generation` was
    /// read. Returns whether the session was cached.
    pub fn insert_if_current(&mut self, key: SessionKey, session: Arc<ToolSession>, generation: u64) -> bool {
        if self.generation(&key.tenant) != generation {
            return false;
        }
        self.insert(key, session);
        true
    }

    /// Drop every session of `tenant`; returns how many were dropped.
    pub fn invalidate_tenant(&mut self, tenant: &str) -> usize {
        *self.generations.entry(tenant.to_owned()).or_default() += 1;
        let before = self.map.len();
        self.map.retain(|key, _| key.tenant != tenant);
        before - self.map.len()
    }

    /// Drop every session of every tenant.
    pub fn clear(&mut self) {
        self.epoch += 1;
        self.map.clear();
    }

    pub fn purge_expired(&mut self) -> usize {
        let before = self.map.len();
        let ttl = self.ttl;
        self.map.retain(|_, session| !session.is_stale(ttl));
        before - self.map.len()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Hash identifying a tool catalog, independent of order.
pub fn catalog_hash(tools: &[String]) -> String {
    let mut sorted: Vec<&str> = tools.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let digest = Sha256::digest(sorted.join("\n").as_bytes());
    format!("{digest:x}")[..16].to_owned()
}

/// Executes tools for tenants with their active account.
pub struct ToolGateway {
    registry: Arc<AccountRegistry>,
    client: Arc<ToolClient>,
    catalog: String,
    cache: Mutex<SessionCache>,
}

impl ToolGateway {
    pub fn new(registry: Arc<AccountRegistry>, client: Arc<ToolClient>, ttl: Duration) -> Arc<Self> {
        let catalog = catalog_hash(&client.config().tools);
        Arc::new(Self { registry, client, catalog, cache: Mutex::new(SessionCache::new(ttl)) })
    }

    pub fn client(&self) -> &Arc<ToolClient> {
        &self.client
    }

    fn key(&self, tenant: &str) -> SessionKey {
        SessionKey { tenant: tenant.to_owned(), catalog: self.catalog.clone() }
    }

    /// Cached session for `tenant`, built from the active account on a miss.
    pub async fn session(&self, tenant: &str) -> Result<Arc<ToolSession>, AuthError> {
        let key = self.key(tenant);
        let generation = {
            let mut cache = self.cache.lock().await;
            if let Some(session) = cache.get(&key) {
                return Ok(session);
            }
            cache.generation(tenant)
        };

        let (account, credential) = self.registry.require_active_credential(tenant).await?;
        let session = Arc::new(ToolSession {
            tenant: tenant.to_owned(),
            account_id: account.id,
            account_name: account.display_name,
            credential,
            client: Arc::clone(&self.client),
            created_at: Instant::now(),
        });
        if self.cache.lock().await.insert_if_current(key, Arc::clone(&session), generation) {
            tracing::debug!(tenant, account = %session.account_id, "tool session created");
        } else {
            tracing::debug!(tenant, account = %session.account_id, "accounts changed, session not cached");
        }
        Ok(session)
    }

    /// Execute `tool` for `tenant` with its active account.
    pub async fn invoke(
        &self,
        tenant: &str,
        tool: &str,
        arguments: &Value,
    ) -> Result<(Arc<ToolSession>, Value), GatewayError> {
        let session = self.session(tenant).await?;
        let value = session.execute(tool, arguments).await?;
        Ok((session, value))
    }

    pub async fn invalidate(&self, tenant: &str) -> usize {
        self.cache.lock().await.invalidate_tenant(tenant)
    }

    pub async fn cached_sessions(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Drop a tenant's cached sessions whenever its accounts change.
    pub fn spawn_invalidator(self: &Arc<Self>, mut event_rx: broadcast::Receiver<AccountEvent>) {
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let event = match event_rx.recv().await {
                    Ok(e) => e,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::debug!(skipped = n, "session invalidator lagged, clearing cache");
                        gateway.cache.lock().await.clear();
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let dropped = gateway.invalidate(event.tenant()).await;
                if dropped > 0 {
                    tracing::debug!(tenant = event.tenant(), dropped, "tool sessions invalidated");
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
