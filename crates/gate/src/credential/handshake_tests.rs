// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::Deserialize;

use super::*;
use crate::store::MemoryStore;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Origin {
    tenant: String,
    channel: String,
}

fn origin() -> Origin {
    Origin { tenant: "u1".to_owned(), channel: "c9".to_owned() }
}

fn handshakes(ttl: Duration) -> HandshakeStateStore {
    HandshakeStateStore::new(Arc::new(MemoryStore::new()), ttl)
}

#[test]
fn tokens_are_unique_and_url_safe() {
    let a = generate_token();
    let b = generate_token();
    assert_ne!(a, b);
    assert_eq!(a.len(), 43);
    assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
}

#[yare::parameterized(
    equal = { "abc", "abc", true },
    different = { "abc", "abd", false },
    shorter = { "ab", "abc", false },
    empty = { "", "", true },
)]
fn constant_time_comparison(a: &str, b: &str, expected: bool) {
    assert_eq!(constant_time_eq(a, b), expected);
}

#[tokio::test]
async fn redeem_returns_context_once() -> anyhow::Result<()> {
    let store = handshakes(DEFAULT_HANDSHAKE_TTL);
    let token = store.issue(&origin()).await?;

    let first: Option<Origin> = store.redeem(&token).await?;
    assert_eq!(first, Some(origin()));
    let second: Option<Origin> = store.redeem(&token).await?;
    assert_eq!(second, None);
    Ok(())
}

#[tokio::test]
async fn unknown_and_empty_tokens_redeem_nothing() -> anyhow::Result<()> {
    let store = handshakes(DEFAULT_HANDSHAKE_TTL);
    let unknown: Option<Origin> = store.redeem("no-such-token").await?;
    let empty: Option<Origin> = store.redeem("").await?;
    assert_eq!(unknown, None);
    assert_eq!(empty, None);
    Ok(())
}

#[tokio::test]
async fn expired_token_redeems_nothing() -> anyhow::Result<()> {
    let store = handshakes(Duration::from_millis(10));
    let token = store.issue(&origin()).await?;
    tokio::time::sleep(Duration::from_millis(30)).await;

    let redeemed: Option<Origin> = store.redeem(&token).await?;
    assert_eq!(redeemed, None);
    Ok(())
}

#[tokio::test]
async fn sweep_deletes_only_stale_records() -> anyhow::Result<()> {
    let store = handshakes(DEFAULT_HANDSHAKE_TTL);
    let stale = store.issue(&Origin { tenant: "old".to_owned(), channel: "c".to_owned() }).await?;
    let fresh = store.issue(&origin()).await?;

    let swept = store.sweep(|o: &Origin| o.tenant == "old").await?;
    assert_eq!(swept, 1);

    let gone: Option<Origin> = store.redeem(&stale).await?;
    assert_eq!(gone, None);
    let kept: Option<Origin> = store.redeem(&fresh).await?;
    assert_eq!(kept, Some(origin()));
    Ok(())
}
