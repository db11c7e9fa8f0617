// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Account registry: per-tenant named accounts with an active pointer,
//! authorization handshakes and account events.
//!
//! An account moves through `INITIATED -> CALLBACK_RECEIVED ->
//! TOKEN_EXCHANGED -> ACCOUNT_SAVED`. Failure at any step leaves no account
//! behind, and the handshake session is consumed on every callback outcome.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::credential::handshake::{constant_time_eq, generate_token, HandshakeStateStore};
use crate::credential::oauth::{self, Identity, TokenResponse};
use crate::credential::store::{CredentialStore, DEFAULT_CREDENTIAL_TTL};
use crate::credential::{Credential, ProviderConfig, ProviderKind};
use crate::error::AuthError;
use crate::selector::{self, Selection, SelectionSettings};
use crate::state::epoch_ms;
use crate::store::{accounts_key, get_json, put_json, KvStore};

/// Validity of an authorization session (30 minutes).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Extra store lifetime of a session past its validity, so a late callback
/// still observes `SessionExpired` rather than `InvalidSession`.
pub const SESSION_RECLAIM_GRACE: Duration = Duration::from_secs(5 * 60);

/// Default interval of the expired-session sweep (5 minutes).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Fallback workspace name when neither the token nor the identity has one.
const UNKNOWN_WORKSPACE: &str = "Unknown Workspace";

/// Registry tuning.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub session_ttl: Duration,
    pub credential_ttl: Duration,
    /// One account per (tenant, provider): saving replaces existing ones.
    pub single_account: bool,
    /// Selection settings for every tenant without its own override. Read at
    /// selection time, never copied into tenant data.
    pub selection: SelectionSettings,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            credential_ttl: DEFAULT_CREDENTIAL_TTL,
            single_account: false,
            selection: SelectionSettings::default(),
        }
    }
}

/// Account metadata. The credential lives in the credential store under
/// [`Account::credential_key`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub provider: String,
    pub display_name: String,
    pub workspace_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub is_active: bool,
    /// Epoch millis.
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<u64>,
}

impl Account {
    pub fn credential_key(&self) -> String {
        format!("{}:{}", self.provider, self.id)
    }
}

/// Everything the registry knows about one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantAccountData {
    /// Registration order.
    pub accounts: IndexMap<String, Account>,
    #[serde(default)]
    pub active_account_id: Option<String>,
    #[serde(default)]
    pub default_account_id: Option<String>,
    /// Tenant override of the configured selection settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionSettings>,
}

impl TenantAccountData {
    fn new() -> Self {
        Self {
            accounts: IndexMap::new(),
            active_account_id: None,
            default_account_id: None,
            selection: None,
        }
    }

    /// Point the active flag at `id` (or nowhere), clearing it elsewhere.
    fn set_active(&mut self, id: Option<&str>) {
        for account in self.accounts.values_mut() {
            account.is_active = Some(account.id.as_str()) == id;
        }
        self.active_account_id = id.map(str::to_owned);
    }

    /// Remove an account, promoting the first remaining one if it was active.
    fn remove(&mut self, id: &str) -> Option<Account> {
        let removed = self.accounts.shift_remove(id)?;
        let first = self.accounts.keys().next().cloned();
        if self.active_account_id.as_deref() == Some(id) {
            self.set_active(first.as_deref());
        }
        if self.default_account_id.as_deref() == Some(id) {
            self.default_account_id = first;
        }
        Some(removed)
    }

    fn ordered(&self) -> Vec<Account> {
        self.accounts.values().cloned().collect()
    }
}

/// An in-flight authorization. Its id is the handshake token it is stored under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeSession {
    pub tenant_id: String,
    pub provider: String,
    pub anti_forgery_state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_alias: Option<String>,
    /// Opaque caller context (e.g. the chat channel to notify).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_context: Option<String>,
    pub created_at: u64,
    pub expires_at: u64,
}

impl HandshakeSession {
    fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms > self.expires_at
    }
}

/// Result of starting an authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationStart {
    pub authorization_url: String,
    pub session_id: String,
}

/// Result of a successful callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackOutcome {
    pub tenant_id: String,
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_context: Option<String>,
}

/// Credential health of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Healthy,
    /// Credential expired or gone; re-authorization required.
    Expired,
}

/// Account with its credential status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    #[serde(flatten)]
    pub account: Account,
    pub status: AccountStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<u64>,
}

/// Events emitted by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AccountEvent {
    Added { tenant: String, account: String },
    Switched { tenant: String, account: String },
    Removed { tenant: String, account: String },
}

impl AccountEvent {
    pub fn tenant(&self) -> &str {
        match self {
            Self::Added { tenant, .. } | Self::Switched { tenant, .. } | Self::Removed { tenant, .. } => {
                tenant
            }
        }
    }
}

/// Per-tenant account registry.
pub struct AccountRegistry {
    store: Arc<dyn KvStore>,
    credentials: CredentialStore,
    handshakes: HandshakeStateStore,
    providers: IndexMap<String, ProviderConfig>,
    config: RegistryConfig,
    event_tx: broadcast::Sender<AccountEvent>,
    http: reqwest::Client,
    /// Serializes read-modify-write cycles on tenant account data.
    write_lock: tokio::sync::Mutex<()>,
}

impl AccountRegistry {
    pub fn new(
        store: Arc<dyn KvStore>,
        providers: Vec<ProviderConfig>,
        config: RegistryConfig,
        event_tx: broadcast::Sender<AccountEvent>,
    ) -> Arc<Self> {
        crate::ensure_crypto_provider();
        let providers = providers.into_iter().map(|p| (p.id.clone(), p)).collect();
        Arc::new(Self {
            credentials: CredentialStore::new(Arc::clone(&store), config.credential_ttl),
            handshakes: HandshakeStateStore::new(
                Arc::clone(&store),
                config.session_ttl + SESSION_RECLAIM_GRACE,
            ),
            store,
            providers,
            config,
            event_tx,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AccountEvent> {
        self.event_tx.subscribe()
    }

    pub fn providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.values()
    }

    /// Look up a provider; `None` picks the first token-exchange provider.
    pub fn provider(&self, id: Option<&str>) -> Result<&ProviderConfig, AuthError> {
        match id {
            Some(id) => {
                self.providers.get(id).ok_or_else(|| AuthError::UnknownProvider(id.to_owned()))
            }
            None => self
                .providers
                .values()
                .find(|p| p.kind == ProviderKind::TokenExchange)
                .ok_or_else(|| AuthError::UnknownProvider("<default>".to_owned())),
        }
    }

    /// Begin an authorization: issue a session and build the URL the tenant
    /// opens at the provider.
    pub async fn add_account(
        &self,
        tenant: &str,
        provider: Option<&str>,
        alias: Option<String>,
        origin_context: Option<String>,
    ) -> Result<AuthorizationStart, AuthError> {
        let provider = self.provider(provider)?;
        if provider.kind != ProviderKind::TokenExchange {
            return Err(AuthError::ProviderMisconfigured {
                provider: provider.id.clone(),
                reason: "pre-authorized providers are seeded, not authorized".to_owned(),
            });
        }
        if provider.client_id.is_empty() {
            return Err(AuthError::ProviderMisconfigured {
                provider: provider.id.clone(),
                reason: "client_id is not configured".to_owned(),
            });
        }

        let now = epoch_ms();
        let session = HandshakeSession {
            tenant_id: tenant.to_owned(),
            provider: provider.id.clone(),
            anti_forgery_state: generate_token(),
            account_alias: alias.filter(|a| !a.trim().is_empty()),
            origin_context,
            created_at: now,
            expires_at: now.saturating_add(self.config.session_ttl.as_millis() as u64),
        };
        let session_id = self.handshakes.issue(&session).await?;
        let state = format!("{session_id}:{}", session.anti_forgery_state);
        let authorization_url = oauth::build_auth_url(provider, &state)?;

        tracing::info!(tenant, provider = %provider.id, "authorization session started");
        Ok(AuthorizationStart { authorization_url, session_id })
    }

    /// Complete an authorization from the provider callback.
    pub async fn handle_callback(&self, code: &str, state: &str) -> Result<CallbackOutcome, AuthError> {
        let (session_id, anti_forgery) = state.split_once(':').ok_or(AuthError::InvalidSession)?;
        let session: HandshakeSession =
            self.handshakes.redeem(session_id).await?.ok_or(AuthError::InvalidSession)?;
        if session.is_expired_at(epoch_ms()) {
            tracing::warn!(tenant = %session.tenant_id, "authorization session expired");
            return Err(AuthError::SessionExpired);
        }
        if !constant_time_eq(anti_forgery, &session.anti_forgery_state) {
            tracing::warn!(tenant = %session.tenant_id, "authorization state mismatch");
            return Err(AuthError::StateMismatch);
        }

        let provider = self.provider(Some(&session.provider))?;
        let token = oauth::exchange_code(&self.http, provider, code).await.inspect_err(|e| {
            tracing::warn!(tenant = %session.tenant_id, err = %e, "token exchange failed");
        })?;
        let identity = match oauth::fetch_identity(&self.http, provider, &token.access_token).await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(tenant = %session.tenant_id, err = %e, "identity lookup failed");
                Identity::default()
            }
        };

        let account_id = self
            .save_account(&session.tenant_id, provider, &token, &identity, session.account_alias)
            .await?;
        tracing::info!(tenant = %session.tenant_id, account = %account_id, "account authorized");
        Ok(CallbackOutcome {
            tenant_id: session.tenant_id,
            account_id,
            origin_context: session.origin_context,
        })
    }

    /// The provider redirected back with `?error=`. Consumes the session.
    pub async fn handle_callback_error(&self, state: Option<&str>, error: &str) -> AuthError {
        let session_id = state.and_then(|s| s.split_once(':')).map(|(id, _)| id);
        if let Some(session_id) = session_id {
            match self.handshakes.redeem::<HandshakeSession>(session_id).await {
                Ok(Some(session)) => {
                    tracing::warn!(tenant = %session.tenant_id, error, "authorization denied");
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(err = %e, "failed to consume authorization session"),
            }
        }
        AuthError::AuthorizationDenied(error.to_owned())
    }

    /// Store a bearer token for a pre-authorized provider without a handshake.
    pub async fn seed_account(
        &self,
        tenant: &str,
        provider: &str,
        name: &str,
        credential: Credential,
    ) -> Result<String, AuthError> {
        let provider = self.provider(Some(provider))?;
        let account = Account {
            id: uuid::Uuid::new_v4().to_string(),
            provider: provider.id.clone(),
            display_name: name.to_owned(),
            workspace_name: name.to_owned(),
            provider_workspace_id: None,
            email: None,
            scopes: credential.scopes.clone(),
            is_active: false,
            created_at: epoch_ms(),
            last_used_at: None,
        };
        let id = self.insert_account(tenant, account, &credential).await?;
        tracing::info!(tenant, account = %id, provider = %provider.id, "account seeded");
        Ok(id)
    }

    async fn save_account(
        &self,
        tenant: &str,
        provider: &ProviderConfig,
        token: &TokenResponse,
        identity: &Identity,
        alias: Option<String>,
    ) -> Result<String, AuthError> {
        let now = epoch_ms();
        let workspace_name = token
            .workspace_name()
            .or(identity.name.as_deref())
            .unwrap_or(UNKNOWN_WORKSPACE)
            .to_owned();
        let credential = Credential::from_token_response(token, now);
        let account = Account {
            id: uuid::Uuid::new_v4().to_string(),
            provider: provider.id.clone(),
            display_name: alias.unwrap_or_else(|| workspace_name.clone()),
            workspace_name,
            provider_workspace_id: token.workspace_id().map(str::to_owned),
            email: identity.email.clone(),
            scopes: credential.scopes.clone(),
            is_active: false,
            created_at: now,
            last_used_at: None,
        };
        self.insert_account(tenant, account, &credential).await
    }

    async fn insert_account(
        &self,
        tenant: &str,
        account: Account,
        credential: &Credential,
    ) -> Result<String, AuthError> {
        let _guard = self.write_lock.lock().await;
        let mut data = self.load(tenant).await?.unwrap_or_else(TenantAccountData::new);

        let (mut took_active, mut took_default) = (false, false);
        if self.config.single_account {
            let replaced: Vec<String> = data
                .accounts
                .values()
                .filter(|a| a.provider == account.provider)
                .map(|a| a.id.clone())
                .collect();
            for id in replaced {
                took_active |= data.active_account_id.as_deref() == Some(id.as_str());
                took_default |= data.default_account_id.as_deref() == Some(id.as_str());
                if let Some(old) = data.remove(&id) {
                    self.credentials.delete(tenant, &old.credential_key()).await?;
                    tracing::debug!(tenant, account = %old.id, "replaced account in single-account mode");
                }
            }
        }

        self.credentials.put(tenant, &account.credential_key(), credential).await?;
        let id = account.id.clone();
        data.accounts.insert(id.clone(), account);
        // A replacement inherits the active and default pointers of the
        // accounts it displaced.
        if took_active || data.active_account_id.is_none() {
            data.set_active(Some(&id));
        }
        if took_default || data.default_account_id.is_none() {
            data.default_account_id = Some(id.clone());
        }
        self.save(tenant, &data).await?;

        let _ = self.event_tx.send(AccountEvent::Added { tenant: tenant.to_owned(), account: id.clone() });
        Ok(id)
    }

    /// Accounts in registration order with their credential status.
    pub async fn list_accounts(&self, tenant: &str) -> Result<Vec<AccountInfo>, AuthError> {
        let Some(data) = self.load(tenant).await? else {
            return Ok(Vec::new());
        };
        let mut infos = Vec::with_capacity(data.accounts.len());
        for account in data.accounts.into_values() {
            let credential = self.credentials.get(tenant, &account.credential_key()).await?;
            let (status, expires_in_secs) = match credential {
                Some(c) => (AccountStatus::Healthy, c.expires_in_secs()),
                None => (AccountStatus::Expired, None),
            };
            infos.push(AccountInfo { account, status, expires_in_secs });
        }
        Ok(infos)
    }

    pub async fn get_account(&self, tenant: &str, id: &str) -> Result<Option<Account>, AuthError> {
        Ok(self.load(tenant).await?.and_then(|mut d| d.accounts.shift_remove(id)))
    }

    /// Credential of the active account, `None` when there is no active
    /// account or its credential expired.
    pub async fn get_active_credential(&self, tenant: &str) -> Result<Option<Credential>, AuthError> {
        match self.require_active_credential(tenant).await {
            Ok((_, credential)) => Ok(Some(credential)),
            Err(AuthError::NoActiveAccount | AuthError::CredentialExpired(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Active account and its credential. Touches `last_used_at` and slides
    /// the credential's store TTL.
    pub async fn require_active_credential(
        &self,
        tenant: &str,
    ) -> Result<(Account, Credential), AuthError> {
        let data = self.load(tenant).await?.ok_or(AuthError::NoActiveAccount)?;
        let id = data.active_account_id.clone().ok_or(AuthError::NoActiveAccount)?;
        let mut account = data.accounts.get(&id).cloned().ok_or(AuthError::NoActiveAccount)?;
        let key = account.credential_key();

        let credential = match self.credentials.get_checked(tenant, &key).await {
            Ok(credential) => credential,
            Err(AuthError::AccountNotFound(_) | AuthError::CredentialExpired(_)) => {
                tracing::warn!(tenant, account = %id, "active credential expired");
                return Err(AuthError::CredentialExpired(id));
            }
            Err(e) => return Err(e),
        };

        // Re-read before writing back: a switch or removal may have landed
        // while the credential was loading. A removed account stays removed.
        let _guard = self.write_lock.lock().await;
        let mut data = self.load(tenant).await?.unwrap_or_else(TenantAccountData::new);
        if let Some(current) = data.accounts.get_mut(&id) {
            current.last_used_at = Some(epoch_ms());
            account = current.clone();
            self.credentials.put(tenant, &key, &credential).await?;
            self.save(tenant, &data).await?;
        }
        Ok((account, credential))
    }

    /// Make `id` the tenant's active account.
    pub async fn switch_account(&self, tenant: &str, id: &str) -> Result<Account, AuthError> {
        let _guard = self.write_lock.lock().await;
        let mut data =
            self.load(tenant).await?.ok_or_else(|| AuthError::AccountNotFound(id.to_owned()))?;
        if !data.accounts.contains_key(id) {
            return Err(AuthError::AccountNotFound(id.to_owned()));
        }
        data.set_active(Some(id));
        let account = data.accounts.get_mut(id).ok_or_else(|| AuthError::AccountNotFound(id.to_owned()))?;
        account.last_used_at = Some(epoch_ms());
        let account = account.clone();
        self.save(tenant, &data).await?;

        tracing::info!(tenant, account = %id, "switched active account");
        let _ = self
            .event_tx
            .send(AccountEvent::Switched { tenant: tenant.to_owned(), account: id.to_owned() });
        Ok(account)
    }

    /// Remove an account and its credential.
    pub async fn remove_account(&self, tenant: &str, id: &str) -> Result<(), AuthError> {
        let _guard = self.write_lock.lock().await;
        let mut data =
            self.load(tenant).await?.ok_or_else(|| AuthError::AccountNotFound(id.to_owned()))?;
        let removed = data.remove(id).ok_or_else(|| AuthError::AccountNotFound(id.to_owned()))?;
        self.credentials.delete(tenant, &removed.credential_key()).await?;
        self.save(tenant, &data).await?;

        tracing::info!(tenant, account = %id, active = ?data.active_account_id, "removed account");
        let _ = self
            .event_tx
            .send(AccountEvent::Removed { tenant: tenant.to_owned(), account: id.to_owned() });
        Ok(())
    }

    /// Pick an account for `text`, switching to it when confident enough.
    pub async fn select_account(&self, tenant: &str, text: &str) -> Result<Selection, AuthError> {
        let data = self.load(tenant).await?.unwrap_or_else(TenantAccountData::new);
        let settings = data.selection.as_ref().unwrap_or(&self.config.selection);
        let selection = selector::select(&data.ordered(), text, settings);

        if let Some(ref id) = selection.account_id {
            let threshold = settings.auto_switch_threshold;
            if selection.should_auto_switch(threshold) && data.active_account_id.as_deref() != Some(id) {
                self.switch_account(tenant, id).await?;
            }
        }
        Ok(selection)
    }

    /// Delete handshake sessions past their validity; returns the count.
    pub async fn sweep_expired_sessions(&self) -> Result<usize, AuthError> {
        let now = epoch_ms();
        let swept = self.handshakes.sweep(|s: &HandshakeSession| s.is_expired_at(now)).await?;
        let purged = self.store.purge_expired().await?;
        if swept > 0 || purged > 0 {
            tracing::debug!(swept, purged, "swept expired sessions");
        }
        Ok(swept)
    }

    /// Run [`sweep_expired_sessions`](Self::sweep_expired_sessions) every
    /// `interval` until shutdown.
    pub fn spawn_session_sweeper(self: &Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if let Err(e) = registry.sweep_expired_sessions().await {
                    tracing::warn!(err = %e, "session sweep failed");
                }
            }
        });
    }

    async fn load(&self, tenant: &str) -> Result<Option<TenantAccountData>, AuthError> {
        Ok(get_json(self.store.as_ref(), &accounts_key(tenant)).await?)
    }

    async fn save(&self, tenant: &str, data: &TenantAccountData) -> Result<(), AuthError> {
        Ok(put_json(self.store.as_ref(), &accounts_key(tenant), data, None).await?)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
