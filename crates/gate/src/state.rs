// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::gateway::ToolGateway;
use crate::registry::AccountRegistry;

/// Shared gateway state.
pub struct GateState {
    pub registry: Arc<AccountRegistry>,
    pub gateway: Arc<ToolGateway>,
    /// Bearer token required on the API. `None` disables auth.
    pub auth_token: Option<String>,
    pub shutdown: CancellationToken,
}

impl GateState {
    pub fn new(
        registry: Arc<AccountRegistry>,
        gateway: Arc<ToolGateway>,
        auth_token: Option<String>,
        shutdown: CancellationToken,
    ) -> Self {
        Self { registry, gateway, auth_token, shutdown }
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
