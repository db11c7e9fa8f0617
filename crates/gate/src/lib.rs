// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docgate: multi-account gateway for a hosted document service.

pub mod config;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod invoke;
pub mod registry;
pub mod selector;
pub mod state;
pub mod store;
pub mod test_support;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::GateConfig;
use crate::gateway::ToolGateway;
use crate::invoke::ToolClient;
use crate::registry::AccountRegistry;
use crate::state::GateState;
use crate::store::{KvStore, MemoryStore};
use crate::transport::build_router;

/// Install the ring crypto provider for rustls (reqwest is built without one).
pub fn ensure_crypto_provider() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Open the configured store backend.
async fn open_store(config: &GateConfig) -> anyhow::Result<Arc<dyn KvStore>> {
    #[cfg(feature = "redis")]
    if let Some(ref url) = config.redis_url {
        return Ok(Arc::new(crate::store::redis::RedisStore::connect(url).await?));
    }

    if config.ephemeral {
        tracing::info!("using ephemeral in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let dir = config.state_dir();
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("store.json");
    tracing::info!(path = %path.display(), "using persistent store");
    Ok(Arc::new(MemoryStore::open(path)?))
}

/// Run the gateway server until shutdown.
pub async fn run(config: GateConfig) -> anyhow::Result<()> {
    config.validate()?;
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let store = open_store(&config).await?;
    let providers = config.providers()?;
    let provider_ids: Vec<String> = providers.iter().map(|p| p.id.clone()).collect();

    let (event_tx, _) = broadcast::channel(64);
    let registry = AccountRegistry::new(store, providers, config.registry_config(), event_tx);

    let client = Arc::new(ToolClient::new(config.invoke_config()));
    if !client.health_check().await {
        tracing::warn!(endpoint = %config.tool_endpoint, "tool endpoint not reachable at startup");
    }

    let gateway = ToolGateway::new(Arc::clone(&registry), client, config.session_cache_ttl());
    gateway.spawn_invalidator(registry.subscribe());
    registry.spawn_session_sweeper(config.sweep_interval(), shutdown.clone());

    let state = Arc::new(GateState::new(
        registry,
        gateway,
        config.auth_token.clone(),
        shutdown.clone(),
    ));

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
            }
            shutdown.cancel();
        });
    }

    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    if config.auth_token.is_some() {
        tracing::info!(providers = ?provider_ids, "docgate listening on {addr} (auth enabled)");
    } else {
        tracing::info!(providers = ?provider_ids, "docgate listening on {addr}");
    }
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
