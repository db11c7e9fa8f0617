// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for account management and the provider callback.
//!
//! The callback page is public and echoes provider and tenant supplied
//! text, so everything rendered into it is escaped.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::Json;
use serde::Deserialize;

use crate::credential::Credential;
use crate::error::{AuthError, GateError};
use crate::state::{epoch_ms, GateState};

/// Query of `GET /oauth/callback`.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Escape text for an HTML body or attribute.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn callback_page(status: StatusCode, title: &str, detail: &str) -> axum::response::Response {
    let (title, detail) = (html_escape(title), html_escape(detail));
    let body = format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body><h1>{title}</h1><p>{detail}</p><p>You can close this window.</p></body></html>"
    );
    (status, Html(body)).into_response()
}

fn callback_failure(e: &AuthError) -> axum::response::Response {
    let status = StatusCode::from_u16(e.code().http_status()).unwrap_or(StatusCode::BAD_REQUEST);
    callback_page(status, "Authorization failed", &e.to_string())
}

/// `GET /oauth/callback`: provider redirect after the tenant grants access.
pub async fn oauth_callback(
    State(s): State<Arc<GateState>>,
    Query(q): Query<CallbackQuery>,
) -> impl IntoResponse {
    if let Some(ref error) = q.error {
        let e = s.registry.handle_callback_error(q.state.as_deref(), error).await;
        return callback_failure(&e);
    }
    let (Some(code), Some(state)) = (q.code.as_deref(), q.state.as_deref()) else {
        return callback_failure(&AuthError::InvalidSession);
    };

    match s.registry.handle_callback(code, state).await {
        Ok(outcome) => {
            let name = s
                .registry
                .get_account(&outcome.tenant_id, &outcome.account_id)
                .await
                .ok()
                .flatten()
                .map(|a| a.display_name)
                .unwrap_or_default();
            callback_page(StatusCode::OK, "Account connected", &format!("Connected {name}."))
        }
        Err(e) => callback_failure(&e),
    }
}

/// Request body for `POST /api/v1/tenants/{tenant}/accounts`.
#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
}

/// `POST /api/v1/tenants/{tenant}/accounts`: start authorizing a new account.
pub async fn start_authorization(
    State(s): State<Arc<GateState>>,
    Path(tenant): Path<String>,
    Json(req): Json<StartRequest>,
) -> impl IntoResponse {
    match s.registry.add_account(&tenant, req.provider.as_deref(), req.alias, req.origin).await {
        Ok(start) => (StatusCode::CREATED, Json(start)).into_response(),
        Err(e) => e.code().to_http_response(e.to_string()).into_response(),
    }
}

/// Request body for `POST /api/v1/tenants/{tenant}/accounts/seed`.
#[derive(Debug, Deserialize)]
pub struct SeedRequest {
    pub provider: String,
    pub name: String,
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// `POST /api/v1/tenants/{tenant}/accounts/seed`: store a pre-authorized token.
pub async fn seed_account(
    State(s): State<Arc<GateState>>,
    Path(tenant): Path<String>,
    Json(req): Json<SeedRequest>,
) -> impl IntoResponse {
    if req.token.is_empty() {
        return GateError::BadRequest.to_http_response("token is required").into_response();
    }
    let credential = Credential {
        access_token: req.token,
        refresh_token: req.refresh_token,
        expires_at: req.expires_in.map(|secs| epoch_ms().saturating_add(secs.saturating_mul(1000))),
        scopes: req.scopes,
        provider_metadata: serde_json::Map::new(),
    };
    match s.registry.seed_account(&tenant, &req.provider, &req.name, credential).await {
        Ok(id) => (StatusCode::CREATED, Json(serde_json::json!({ "account_id": id }))).into_response(),
        Err(e) => e.code().to_http_response(e.to_string()).into_response(),
    }
}

/// `GET /api/v1/tenants/{tenant}/accounts`
pub async fn list_accounts(
    State(s): State<Arc<GateState>>,
    Path(tenant): Path<String>,
) -> impl IntoResponse {
    match s.registry.list_accounts(&tenant).await {
        Ok(accounts) => Json(accounts).into_response(),
        Err(e) => e.code().to_http_response(e.to_string()).into_response(),
    }
}

/// `DELETE /api/v1/tenants/{tenant}/accounts/{id}`
pub async fn remove_account(
    State(s): State<Arc<GateState>>,
    Path((tenant, id)): Path<(String, String)>,
) -> impl IntoResponse {
    match s.registry.remove_account(&tenant, &id).await {
        Ok(()) => Json(serde_json::json!({ "removed": id })).into_response(),
        Err(e) => e.code().to_http_response(e.to_string()).into_response(),
    }
}

/// Request body for `PUT /api/v1/tenants/{tenant}/active`.
#[derive(Debug, Deserialize)]
pub struct SwitchRequest {
    pub account_id: String,
}

/// `PUT /api/v1/tenants/{tenant}/active`: switch the active account.
pub async fn switch_account(
    State(s): State<Arc<GateState>>,
    Path(tenant): Path<String>,
    Json(req): Json<SwitchRequest>,
) -> impl IntoResponse {
    match s.registry.switch_account(&tenant, &req.account_id).await {
        Ok(account) => Json(account).into_response(),
        Err(e) => e.code().to_http_response(e.to_string()).into_response(),
    }
}

#[cfg(test)]
#[path = "http_account_tests.rs"]
mod tests;
