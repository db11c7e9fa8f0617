// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth authorization code helpers: authorization URL, code exchange and
//! identity lookup.

use std::fmt;

use reqwest::Url;
use serde::Deserialize;

use crate::credential::ProviderConfig;
use crate::error::AuthError;

/// Token endpoint response.
///
/// Provider-specific fields (`workspace_id`, `workspace_name`, `bot_id`,
/// `owner`, ...) are kept in `metadata`.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl TokenResponse {
    pub fn workspace_name(&self) -> Option<&str> {
        self.metadata_str("workspace_name")
    }

    pub fn workspace_id(&self) -> Option<&str> {
        self.metadata_str("workspace_id")
    }

    fn metadata_str(&self, field: &str) -> Option<&str> {
        self.metadata.get(field).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("workspace_id", &self.workspace_id())
            .finish_non_exhaustive()
    }
}

/// The user who completed the authorization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Deserialize)]
struct IdentityBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    person: Option<PersonBody>,
}

#[derive(Deserialize)]
struct PersonBody {
    #[serde(default)]
    email: Option<String>,
}

/// Build the authorization URL the tenant opens to grant access.
pub fn build_auth_url(provider: &ProviderConfig, state: &str) -> Result<String, AuthError> {
    let mut params: Vec<(&str, &str)> = vec![
        ("client_id", provider.client_id.as_str()),
        ("response_type", "code"),
        ("redirect_uri", provider.redirect_uri.as_str()),
        ("state", state),
    ];
    for (key, value) in &provider.extra_auth_params {
        params.push((key.as_str(), value.as_str()));
    }
    let scope = provider.scopes.join(" ");
    if !scope.is_empty() {
        params.push(("scope", scope.as_str()));
    }
    let url = Url::parse_with_params(&provider.auth_url, &params).map_err(|e| {
        AuthError::ProviderMisconfigured {
            provider: provider.id.clone(),
            reason: format!("invalid auth_url: {e}"),
        }
    })?;
    Ok(url.into())
}

/// Exchange an authorization code for tokens (form body, HTTP Basic client auth).
pub async fn exchange_code(
    client: &reqwest::Client,
    provider: &ProviderConfig,
    code: &str,
) -> Result<TokenResponse, AuthError> {
    let form = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", provider.redirect_uri.as_str()),
    ];
    let mut req = client
        .post(&provider.token_url)
        .basic_auth(&provider.client_id, Some(&provider.client_secret))
        .form(&form);
    if let Some(ref version) = provider.api_version {
        req = req.header("Notion-Version", version);
    }

    let resp = req.send().await.map_err(|e| AuthError::Exchange(format!("request failed: {e}")))?;
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(AuthError::Exchange(format!("token endpoint returned {status}: {text}")));
    }
    resp.json::<TokenResponse>()
        .await
        .map_err(|e| AuthError::Exchange(format!("invalid token response: {e}")))
}

/// Look up who authorized the access token.
///
/// Providers without an identity endpoint yield an empty identity.
pub async fn fetch_identity(
    client: &reqwest::Client,
    provider: &ProviderConfig,
    access_token: &str,
) -> Result<Identity, AuthError> {
    let Some(ref url) = provider.identity_url else {
        return Ok(Identity::default());
    };
    let mut req = client.get(url).bearer_auth(access_token);
    if let Some(ref version) = provider.api_version {
        req = req.header("Notion-Version", version);
    }

    let resp = req.send().await.map_err(|e| AuthError::Exchange(format!("identity lookup failed: {e}")))?;
    if !resp.status().is_success() {
        return Err(AuthError::Exchange(format!("identity endpoint returned {}", resp.status())));
    }
    let body: IdentityBody = resp
        .json()
        .await
        .map_err(|e| AuthError::Exchange(format!("invalid identity response: {e}")))?;
    Ok(Identity { name: body.name, email: body.person.and_then(|p| p.email) })
}

#[cfg(test)]
#[path = "oauth_tests.rs"]
mod tests;
