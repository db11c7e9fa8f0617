// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the gateway.

pub mod auth;
pub mod http;
pub mod http_account;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::GateState;

/// Build the axum `Router` with all gateway routes.
pub fn build_router(state: Arc<GateState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Provider redirect (no auth)
        .route("/oauth/callback", get(http_account::oauth_callback))
        // Accounts
        .route(
            "/api/v1/tenants/{tenant}/accounts",
            post(http_account::start_authorization).get(http_account::list_accounts),
        )
        .route("/api/v1/tenants/{tenant}/accounts/seed", post(http_account::seed_account))
        .route("/api/v1/tenants/{tenant}/accounts/{id}", delete(http_account::remove_account))
        .route("/api/v1/tenants/{tenant}/active", put(http_account::switch_account))
        // Selection and tools
        .route("/api/v1/tenants/{tenant}/select", post(http::select_account))
        .route("/api/v1/tenants/{tenant}/invoke", post(http::invoke_tool))
        .route("/api/v1/tools", get(http::list_tools))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
