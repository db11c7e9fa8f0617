// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key/value storage with per-key expiry.
//!
//! Everything the gateway persists (tenant account data, bearer credentials,
//! handshake records) goes through [`KvStore`]. Two backends exist: the
//! in-process [`memory::MemoryStore`] and, behind the `redis` feature,
//! [`redis::RedisStore`].

pub mod memory;
pub mod persist;
#[cfg(feature = "redis")]
pub mod redis;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use memory::MemoryStore;

/// Boxed future returned by [`KvStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors raised by a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored value is not valid JSON: {0}")]
    Codec(#[from] serde_json::Error),
    #[cfg(feature = "redis")]
    #[error("redis: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// TTL-capable string store.
///
/// Each key expires independently. Expired keys are never returned.
pub trait KvStore: Send + Sync + 'static {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    /// Overwrite `key`. `ttl` of `None` keeps the value until deleted.
    fn put<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl: Option<Duration>,
    ) -> StoreFuture<'a, ()>;

    /// Returns whether a live value was removed.
    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool>;

    /// Atomically read and delete. Of two concurrent takes at most one sees
    /// the value.
    fn take<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    /// Live keys starting with `prefix`.
    fn keys<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>>;

    /// Drop entries whose TTL elapsed; returns how many were dropped.
    /// Backends with native expiry return 0.
    fn purge_expired(&self) -> StoreFuture<'_, usize>;
}

/// Read and decode a JSON value.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encode and write a JSON value.
pub async fn put_json<T: Serialize + ?Sized>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value)?;
    store.put(key, raw, ttl).await
}

/// Take and decode a JSON value.
pub async fn take_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.take(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Key of a tenant's account data.
pub fn accounts_key(tenant: &str) -> String {
    format!("tenant:{tenant}:accounts")
}

/// Key of a stored bearer credential.
pub fn token_key(tenant: &str, key: &str) -> String {
    format!("oauth:token:{tenant}:{key}")
}

/// Prefix shared by all handshake records.
pub const HANDSHAKE_PREFIX: &str = "oauth:handshake:";

/// Key of a handshake record.
pub fn handshake_key(token: &str) -> String {
    format!("{HANDSHAKE_PREFIX}{token}")
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
