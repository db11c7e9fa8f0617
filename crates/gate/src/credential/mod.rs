// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant credentials: provider configuration, OAuth code exchange, bearer
//! token storage and single-use authorization handshakes.
//!
//! Providers come from `--provider-config <path>` or from the built-in
//! defaults (`notion`, `notion-mcp`) combined with the `--client-*` flags.

pub mod handshake;
pub mod oauth;
pub mod store;

use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::credential::oauth::TokenResponse;
use crate::state::epoch_ms;

/// Document service API version sent with every provider call.
pub const NOTION_API_VERSION: &str = "2022-06-28";

/// A bearer credential for one account.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry as epoch millis. `None` never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Opaque provider fields from the token response (workspace, bot, owner).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub provider_metadata: serde_json::Map<String, serde_json::Value>,
}

impl Credential {
    /// A credential with no expiry and no scopes.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            scopes: Vec::new(),
            provider_metadata: serde_json::Map::new(),
        }
    }

    /// Build a credential from a token endpoint response received at `now_ms`.
    pub fn from_token_response(token: &TokenResponse, now_ms: u64) -> Self {
        let scopes = match token.scope.as_deref() {
            Some(scope) if !scope.trim().is_empty() => {
                scope.split_whitespace().map(str::to_owned).collect()
            }
            _ => vec!["read".to_owned()],
        };
        Self {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token.expires_in.map(|s| now_ms.saturating_add(s.saturating_mul(1000))),
            scopes,
            provider_metadata: token.metadata.clone(),
        }
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now_ms)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(epoch_ms())
    }

    /// Seconds until expiry, `None` for non-expiring credentials.
    pub fn expires_in_secs(&self) -> Option<u64> {
        self.expires_at.map(|at| at.saturating_sub(epoch_ms()) / 1000)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

/// How a provider hands out credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Authorization code flow with a code-for-token exchange.
    TokenExchange,
    /// Bearer token supplied up front and sent as a request header.
    PreAuthorized,
}

/// Configuration for one credential provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub client_id: String,
    #[serde(default, skip_serializing)]
    pub client_secret: String,
    #[serde(default)]
    pub auth_url: String,
    #[serde(default)]
    pub token_url: String,
    #[serde(default)]
    pub redirect_uri: String,
    /// Endpoint returning the authorizing user (`{name, person: {email}}`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_url: Option<String>,
    /// Sent as the `Notion-Version` header on provider calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    /// Extra authorization URL parameters, appended in order.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extra_auth_params: IndexMap<String, String>,
}

impl ProviderConfig {
    /// Built-in document service provider using the token exchange flow.
    pub fn notion(client_id: &str, client_secret: &str, redirect_uri: &str) -> Self {
        Self {
            id: "notion".to_owned(),
            kind: ProviderKind::TokenExchange,
            client_id: client_id.to_owned(),
            client_secret: client_secret.to_owned(),
            auth_url: "https://api.notion.com/v1/oauth/authorize".to_owned(),
            token_url: "https://api.notion.com/v1/oauth/token".to_owned(),
            redirect_uri: redirect_uri.to_owned(),
            identity_url: Some("https://api.notion.com/v1/users/me".to_owned()),
            api_version: Some(NOTION_API_VERSION.to_owned()),
            scopes: Vec::new(),
            extra_auth_params: IndexMap::from([("owner".to_owned(), "user".to_owned())]),
        }
    }

    /// Built-in hosted tool endpoint provider taking a pre-authorized bearer header.
    pub fn notion_mcp() -> Self {
        Self {
            id: "notion-mcp".to_owned(),
            kind: ProviderKind::PreAuthorized,
            client_id: String::new(),
            client_secret: String::new(),
            auth_url: String::new(),
            token_url: String::new(),
            redirect_uri: String::new(),
            identity_url: None,
            api_version: Some(NOTION_API_VERSION.to_owned()),
            scopes: Vec::new(),
            extra_auth_params: IndexMap::new(),
        }
    }
}

/// Provider list loaded from `--provider-config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderFile {
    pub providers: Vec<ProviderConfig>,
}

/// Resolve the state directory for gateway data.
///
/// Checks `DOCGATE_STATE_DIR`, then `$XDG_STATE_HOME/docgate`,
/// then `$HOME/.local/state/docgate`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DOCGATE_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("docgate");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/docgate");
    }
    PathBuf::from(".docgate")
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
