// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis store backend.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::store::{KvStore, StoreError, StoreFuture};

/// Store backed by a shared Redis connection. Expiry is native (`PX`).
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!("connected to redis store");
        Ok(Self { conn })
    }
}

impl KvStore for RedisStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let value: Option<String> = conn.get(key).await?;
            Ok(value)
        })
    }

    fn put<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl: Option<Duration>,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value);
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg((ttl.as_millis() as u64).max(1));
            }
            let _: () = cmd.query_async(&mut conn).await?;
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let removed: u64 = conn.del(key).await?;
            Ok(removed > 0)
        })
    }

    fn take<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let value: Option<String> = redis::cmd("GETDEL").arg(key).query_async(&mut conn).await?;
            Ok(value)
        })
    }

    fn keys<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let mut keys: Vec<String> = conn.keys(format!("{prefix}*")).await?;
            keys.sort();
            Ok(keys)
        })
    }

    fn purge_expired(&self) -> StoreFuture<'_, usize> {
        Box::pin(async { Ok(0) })
    }
}
