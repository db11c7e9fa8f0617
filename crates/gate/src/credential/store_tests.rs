// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::store::MemoryStore;

fn credentials() -> (Arc<MemoryStore>, CredentialStore) {
    let backend = Arc::new(MemoryStore::new());
    let store = CredentialStore::new(backend.clone(), DEFAULT_CREDENTIAL_TTL);
    (backend, store)
}

#[tokio::test]
async fn put_then_get() -> anyhow::Result<()> {
    let (_, store) = credentials();
    store.put("u1", "notion:a1", &Credential::bearer("tok")).await?;

    let cred = store.get("u1", "notion:a1").await?;
    assert_eq!(cred.map(|c| c.access_token), Some("tok".to_owned()));
    assert!(store.get("u2", "notion:a1").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn last_write_wins() -> anyhow::Result<()> {
    let (_, store) = credentials();
    store.put("u1", "k", &Credential::bearer("first")).await?;
    store.put("u1", "k", &Credential::bearer("second")).await?;
    let cred = store.get("u1", "k").await?;
    assert_eq!(cred.map(|c| c.access_token), Some("second".to_owned()));
    Ok(())
}

#[tokio::test]
async fn expired_credential_is_absent_and_deleted() -> anyhow::Result<()> {
    let (backend, store) = credentials();
    let mut cred = Credential::bearer("tok");
    cred.expires_at = Some(epoch_ms().saturating_sub(1_000));
    store.put("u1", "k", &cred).await?;

    assert!(store.get("u1", "k").await?.is_none());
    assert!(backend.get(&token_key("u1", "k")).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn get_checked_distinguishes_expired_from_missing() -> anyhow::Result<()> {
    let (_, store) = credentials();
    let mut cred = Credential::bearer("tok");
    cred.expires_at = Some(epoch_ms().saturating_sub(1));
    store.put("u1", "old", &cred).await?;

    let expired = store.get_checked("u1", "old").await;
    assert!(matches!(expired, Err(AuthError::CredentialExpired(_))));
    let missing = store.get_checked("u1", "nothing").await;
    assert!(matches!(missing, Err(AuthError::AccountNotFound(_))));
    Ok(())
}

#[tokio::test]
async fn delete_is_scoped_to_key() -> anyhow::Result<()> {
    let (backend, store) = credentials();
    store.put("u1", "notion:a", &Credential::bearer("1")).await?;
    store.put("u1", "notion:b", &Credential::bearer("2")).await?;
    store.put("u2", "notion:c", &Credential::bearer("3")).await?;

    assert!(store.delete("u1", "notion:a").await?);
    assert!(!store.delete("u1", "notion:a").await?);
    assert_eq!(backend.keys("oauth:token:u1:").await?, vec!["oauth:token:u1:notion:b".to_owned()]);
    assert!(store.get("u2", "notion:c").await?.is_some());
    Ok(())
}

#[tokio::test]
async fn store_ttl_bounds_idle_credentials() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryStore::new());
    let store = CredentialStore::new(backend, Duration::from_millis(10));
    store.put("u1", "k", &Credential::bearer("tok")).await?;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(store.get("u1", "k").await?.is_none());
    Ok(())
}
