// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for health, tool catalog, selection and invocation.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::GateError;
use crate::state::GateState;

/// Response for `GET /api/v1/health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub providers: Vec<String>,
    pub cached_sessions: usize,
}

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<GateState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        providers: s.registry.providers().map(|p| p.id.clone()).collect(),
        cached_sessions: s.gateway.cached_sessions().await,
    })
}

/// `GET /api/v1/tools`: catalog advertised by the tool endpoint.
pub async fn list_tools(State(s): State<Arc<GateState>>) -> impl IntoResponse {
    match s.gateway.client().list_tools().await {
        Ok(tools) => Json(serde_json::json!({ "count": tools.len(), "tools": tools })).into_response(),
        Err(e) => e.code().to_http_response(e.to_string()).into_response(),
    }
}

/// Request body for `POST /api/v1/tenants/{tenant}/select`.
#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub text: String,
}

/// `POST /api/v1/tenants/{tenant}/select`: pick (and maybe switch to) an
/// account for a request.
pub async fn select_account(
    State(s): State<Arc<GateState>>,
    Path(tenant): Path<String>,
    Json(req): Json<SelectRequest>,
) -> impl IntoResponse {
    match s.registry.select_account(&tenant, &req.text).await {
        Ok(selection) => Json(selection).into_response(),
        Err(e) => e.code().to_http_response(e.to_string()).into_response(),
    }
}

/// Request body for `POST /api/v1/tenants/{tenant}/invoke`.
#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    pub tool: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Response for `POST /api/v1/tenants/{tenant}/invoke`.
#[derive(Debug, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub account_id: String,
    pub account_name: String,
    pub result: serde_json::Value,
}

/// `POST /api/v1/tenants/{tenant}/invoke`: run a tool with the active account.
pub async fn invoke_tool(
    State(s): State<Arc<GateState>>,
    Path(tenant): Path<String>,
    Json(req): Json<InvokeRequest>,
) -> impl IntoResponse {
    if req.tool.is_empty() {
        return GateError::BadRequest.to_http_response("tool is required").into_response();
    }
    match s.gateway.invoke(&tenant, &req.tool, &req.arguments).await {
        Ok((session, result)) => Json(InvokeResponse {
            account_id: session.account_id.clone(),
            account_name: session.account_name.clone(),
            result,
        })
        .into_response(),
        Err(e) => e.code().to_http_response(e.to_string()).into_response(),
    }
}
