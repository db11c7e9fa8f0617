// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use docgate::config::GateConfig;

fn init_tracing(config: &GateConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    if config.log_format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    let config = GateConfig::parse();
    init_tracing(&config);

    docgate::ensure_crypto_provider();

    if let Err(e) = docgate::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
