// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer credential storage keyed by (tenant, key).

use std::sync::Arc;
use std::time::Duration;

use crate::credential::Credential;
use crate::error::AuthError;
use crate::state::epoch_ms;
use crate::store::{get_json, put_json, token_key, KvStore, StoreError};

/// Default store TTL for a credential (30 days).
pub const DEFAULT_CREDENTIAL_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Stores one credential per (tenant, key).
///
/// Every write resets the store TTL. Reads check `expires_at` lazily and
/// delete a credential found expired.
pub struct CredentialStore {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Overwrite the credential under (tenant, key). Last write wins.
    pub async fn put(&self, tenant: &str, key: &str, credential: &Credential) -> Result<(), StoreError> {
        put_json(self.store.as_ref(), &token_key(tenant, key), credential, Some(self.ttl)).await
    }

    /// Live credential under (tenant, key), if any.
    pub async fn get(&self, tenant: &str, key: &str) -> Result<Option<Credential>, StoreError> {
        match self.get_checked(tenant, key).await {
            Ok(credential) => Ok(Some(credential)),
            Err(AuthError::Store(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }

    /// Like [`get`](Self::get) but distinguishes an expired credential
    /// (`CredentialExpired`) from an absent one (`AccountNotFound`).
    pub async fn get_checked(&self, tenant: &str, key: &str) -> Result<Credential, AuthError> {
        let store_key = token_key(tenant, key);
        let credential: Credential = get_json(self.store.as_ref(), &store_key)
            .await?
            .ok_or_else(|| AuthError::AccountNotFound(key.to_owned()))?;
        if credential.is_expired_at(epoch_ms()) {
            self.store.delete(&store_key).await?;
            tracing::debug!(tenant, key, "dropped expired credential");
            return Err(AuthError::CredentialExpired(key.to_owned()));
        }
        Ok(credential)
    }

    /// Returns whether a credential was removed.
    pub async fn delete(&self, tenant: &str, key: &str) -> Result<bool, StoreError> {
        self.store.delete(&token_key(tenant, key)).await
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
