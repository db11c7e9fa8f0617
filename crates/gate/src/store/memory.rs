// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process store backend.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::state::epoch_ms;
use crate::store::persist::{self, SnapshotEntry};
use crate::store::{KvStore, StoreError, StoreFuture};

/// Mutex-guarded map with lazy expiry.
///
/// When opened with a snapshot path every mutation rewrites the snapshot,
/// so values (and their absolute expiry) survive a restart. The file write
/// runs on the blocking pool; the map lock is held until it lands so
/// snapshots are written in mutation order.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, SnapshotEntry>>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()), snapshot: None }
    }

    /// Open a store backed by a snapshot file, loading live entries from it.
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let now = epoch_ms();
        let mut entries = persist::load(&path)?;
        entries.retain(|_, entry| !entry.is_expired(now));
        tracing::info!(path = %path.display(), entries = entries.len(), "store snapshot loaded");
        Ok(Self { entries: Mutex::new(entries), snapshot: Some(path) })
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = epoch_ms();
        self.entries.lock().await.values().filter(|e| !e.is_expired(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn save(&self, entries: &HashMap<String, SnapshotEntry>) -> Result<(), StoreError> {
        let Some(ref path) = self.snapshot else {
            return Ok(());
        };
        let json = persist::encode(entries)?;
        let path = path.clone();
        tokio::task::spawn_blocking(move || persist::write(&path, &json))
            .await
            .map_err(std::io::Error::other)?
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let now = epoch_ms();
            let mut entries = self.entries.lock().await;
            if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
                entries.remove(key);
            }
            Ok(entries.get(key).map(|entry| entry.value.clone()))
        })
    }

    fn put<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl: Option<Duration>,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let expires_at = ttl.map(|ttl| epoch_ms().saturating_add(ttl.as_millis() as u64));
            let mut entries = self.entries.lock().await;
            entries.insert(key.to_owned(), SnapshotEntry { value, expires_at });
            self.save(&entries).await
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            match entries.remove(key) {
                Some(entry) => {
                    self.save(&entries).await?;
                    Ok(!entry.is_expired(epoch_ms()))
                }
                None => Ok(false),
            }
        })
    }

    fn take<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            match entries.remove(key) {
                Some(entry) => {
                    self.save(&entries).await?;
                    if entry.is_expired(epoch_ms()) {
                        Ok(None)
                    } else {
                        Ok(Some(entry.value))
                    }
                }
                None => Ok(None),
            }
        })
    }

    fn keys<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            let now = epoch_ms();
            let entries = self.entries.lock().await;
            let mut keys: Vec<String> = entries
                .iter()
                .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect();
            keys.sort();
            Ok(keys)
        })
    }

    fn purge_expired(&self) -> StoreFuture<'_, usize> {
        Box::pin(async move {
            let now = epoch_ms();
            let mut entries = self.entries.lock().await;
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(now));
            let purged = before - entries.len();
            if purged > 0 {
                self.save(&entries).await?;
            }
            Ok(purged)
        })
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
