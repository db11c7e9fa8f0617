// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-use authorization handshake records.
//!
//! A handshake carries caller context across the redirect to the provider.
//! It is keyed by an opaque random token, expires with the store TTL and is
//! deleted on first read, so a token can be redeemed at most once.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::store::{get_json, handshake_key, put_json, take_json, KvStore, StoreError, HANDSHAKE_PREFIX};

/// Default handshake lifetime (10 minutes).
pub const DEFAULT_HANDSHAKE_TTL: Duration = Duration::from_secs(10 * 60);

/// Generate an opaque token (32 random bytes, URL-safe base64, 43 chars).
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Constant-time string comparison.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// TTL-backed, destructively redeemed handshake store.
pub struct HandshakeStateStore {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl HandshakeStateStore {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Store `context` under a fresh token.
    pub async fn issue<T: Serialize>(&self, context: &T) -> Result<String, StoreError> {
        let token = generate_token();
        put_json(self.store.as_ref(), &handshake_key(&token), context, Some(self.ttl)).await?;
        Ok(token)
    }

    /// Take the context for `token`. Unknown, consumed or expired tokens
    /// yield `None`.
    pub async fn redeem<T: DeserializeOwned>(&self, token: &str) -> Result<Option<T>, StoreError> {
        if token.is_empty() {
            return Ok(None);
        }
        take_json(self.store.as_ref(), &handshake_key(token)).await
    }

    /// Delete every live record for which `is_stale` holds; returns the count.
    ///
    /// Records of another shape are left to the store TTL.
    pub async fn sweep<T, F>(&self, is_stale: F) -> Result<usize, StoreError>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let mut swept = 0;
        for key in self.store.keys(HANDSHAKE_PREFIX).await? {
            let stale = match get_json::<T>(self.store.as_ref(), &key).await {
                Ok(Some(context)) => is_stale(&context),
                Ok(None) | Err(StoreError::Codec(_)) => false,
                Err(e) => return Err(e),
            };
            if stale && self.store.delete(&key).await? {
                swept += 1;
            }
        }
        Ok(swept)
    }
}

#[cfg(test)]
#[path = "handshake_tests.rs"]
mod tests;
