// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use crate::credential::{ProviderConfig, ProviderFile};
use crate::invoke::{InvokeConfig, RetryPolicy};
use crate::registry::RegistryConfig;
use crate::selector::{self, SelectionSettings};

/// Configuration for the docgate server.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "docgate", version, about = "Multi-account gateway for a document service")]
pub struct GateConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "DOCGATE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 3001, env = "DOCGATE_PORT")]
    pub port: u16,

    /// Bearer token for API auth. If unset, auth is disabled.
    #[arg(long, env = "DOCGATE_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Directory for persisted state. Defaults to the XDG state dir.
    #[arg(long, env = "DOCGATE_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Keep all state in memory only.
    #[arg(long, env = "DOCGATE_EPHEMERAL")]
    pub ephemeral: bool,

    /// Redis URL. When set, state lives in Redis instead of the local store.
    #[cfg(feature = "redis")]
    #[arg(long, env = "DOCGATE_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Path to a provider configuration JSON file (`{"providers": [...]}`).
    #[arg(long, env = "DOCGATE_PROVIDER_CONFIG")]
    pub provider_config: Option<PathBuf>,

    /// Client id of the built-in provider.
    #[arg(long, env = "NOTION_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Client secret of the built-in provider.
    #[arg(long, env = "NOTION_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Redirect URI registered with the built-in provider.
    #[arg(long, default_value = "http://localhost:3001/oauth/callback", env = "NOTION_REDIRECT_URI")]
    pub redirect_uri: String,

    /// Base URL of the remote tool execution endpoint.
    #[arg(long, default_value = "http://127.0.0.1:3000", env = "DOCGATE_TOOL_ENDPOINT")]
    pub tool_endpoint: String,

    /// Per-attempt timeout of tool calls in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "DOCGATE_INVOKE_TIMEOUT_MS")]
    pub invoke_timeout_ms: u64,

    /// Retries after the first attempt of a tool call.
    #[arg(long, default_value_t = 2, env = "DOCGATE_INVOKE_MAX_RETRIES")]
    pub invoke_max_retries: u32,

    /// Validity of an authorization session in seconds.
    #[arg(long, default_value_t = 1800, env = "DOCGATE_SESSION_TTL_SECS")]
    pub session_ttl_secs: u64,

    /// Credential lifetime in seconds, renewed on use.
    #[arg(long, default_value_t = 2_592_000, env = "DOCGATE_CREDENTIAL_TTL_SECS")]
    pub credential_ttl_secs: u64,

    /// Expired-session sweep interval in milliseconds.
    #[arg(long, default_value_t = 300_000, env = "DOCGATE_SWEEP_INTERVAL_MS")]
    pub sweep_interval_ms: u64,

    /// Lifetime of a cached tool session in seconds.
    #[arg(long, default_value_t = 3600, env = "DOCGATE_SESSION_CACHE_TTL_SECS")]
    pub session_cache_ttl_secs: u64,

    /// Confidence above which a selection switches the active account.
    #[arg(long, default_value_t = selector::DEFAULT_AUTO_SWITCH_THRESHOLD, env = "DOCGATE_AUTO_SWITCH_THRESHOLD")]
    pub auto_switch_threshold: f32,

    /// Work keywords (comma separated). Empty uses the built-in list.
    #[arg(long, value_delimiter = ',', env = "DOCGATE_WORK_KEYWORDS")]
    pub work_keywords: Vec<String>,

    /// Personal keywords (comma separated). Empty uses the built-in list.
    #[arg(long, value_delimiter = ',', env = "DOCGATE_PERSONAL_KEYWORDS")]
    pub personal_keywords: Vec<String>,

    /// One account per tenant and provider; a new authorization replaces it.
    #[arg(long, env = "DOCGATE_SINGLE_ACCOUNT")]
    pub single_account: bool,

    /// Log level filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info", env = "DOCGATE_LOG_LEVEL")]
    pub log_level: String,

    /// Log format: `plain` or `json`.
    #[arg(long, default_value = "plain", env = "DOCGATE_LOG_FORMAT")]
    pub log_format: String,
}

impl GateConfig {
    /// Reject settings the server cannot start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.auto_switch_threshold) {
            anyhow::bail!(
                "--auto-switch-threshold must be within [0, 1], got {}",
                self.auto_switch_threshold
            );
        }
        if self.invoke_timeout_ms == 0 {
            anyhow::bail!("--invoke-timeout-ms must be positive");
        }
        if self.session_ttl_secs == 0 {
            anyhow::bail!("--session-ttl-secs must be positive");
        }
        if self.sweep_interval_ms == 0 {
            anyhow::bail!("--sweep-interval-ms must be positive");
        }
        match self.log_format.as_str() {
            "plain" | "json" => {}
            other => anyhow::bail!("unknown log format: {other}"),
        }
        if self.client_id.is_some() != self.client_secret.is_some() {
            anyhow::bail!("--client-id and --client-secret must be given together");
        }
        Ok(())
    }

    /// Provider list: the config file when given, else the built-ins.
    ///
    /// The token-exchange built-in is only included when client credentials
    /// are configured.
    pub fn providers(&self) -> anyhow::Result<Vec<ProviderConfig>> {
        if let Some(ref path) = self.provider_config {
            let contents = std::fs::read_to_string(path)?;
            let file: ProviderFile = serde_json::from_str(&contents)?;
            if file.providers.is_empty() {
                anyhow::bail!("{} lists no providers", path.display());
            }
            return Ok(file.providers);
        }

        let mut providers = Vec::new();
        if let (Some(id), Some(secret)) = (&self.client_id, &self.client_secret) {
            providers.push(ProviderConfig::notion(id, secret, &self.redirect_uri));
        }
        providers.push(ProviderConfig::notion_mcp());
        Ok(providers)
    }

    pub fn selection_settings(&self) -> SelectionSettings {
        let or_default = |list: &[String], default: fn() -> Vec<String>| {
            let list: Vec<String> = list
                .iter()
                .map(|k| k.trim().to_owned())
                .filter(|k| !k.is_empty())
                .collect();
            if list.is_empty() {
                default()
            } else {
                list
            }
        };
        SelectionSettings {
            work_keywords: or_default(&self.work_keywords, selector::default_work_keywords),
            personal_keywords: or_default(
                &self.personal_keywords,
                selector::default_personal_keywords,
            ),
            auto_switch_threshold: self.auto_switch_threshold,
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            session_ttl: Duration::from_secs(self.session_ttl_secs),
            credential_ttl: Duration::from_secs(self.credential_ttl_secs),
            single_account: self.single_account,
            selection: self.selection_settings(),
        }
    }

    pub fn invoke_config(&self) -> InvokeConfig {
        let mut config = InvokeConfig::new(self.tool_endpoint.as_str());
        config.timeout = Duration::from_millis(self.invoke_timeout_ms);
        config.retry = RetryPolicy { max_retries: self.invoke_max_retries, ..RetryPolicy::default() };
        config
    }

    /// Resolved state directory.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(crate::credential::state_dir)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn session_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.session_cache_ttl_secs)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
