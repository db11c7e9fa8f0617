// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::credential::handshake::constant_time_eq;
use crate::error::GateError;
use crate::state::GateState;

/// Routes reachable without the API token. The provider redirects the
/// tenant's browser to the callback, which cannot carry a bearer header.
const PUBLIC_PATHS: &[&str] = &["/api/v1/health", "/oauth/callback"];

/// Check the `Authorization: Bearer` header against `expected`.
/// `None` disables the check.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), GateError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(GateError::Unauthorized)?;
    if constant_time_eq(presented, expected) {
        Ok(())
    } else {
        Err(GateError::Unauthorized)
    }
}

/// Middleware rejecting API calls without the configured bearer token.
pub async fn auth_layer(
    State(s): State<Arc<GateState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if PUBLIC_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }
    match validate_bearer(req.headers(), s.auth_token.as_deref()) {
        Ok(()) => next.run(req).await,
        Err(code) => {
            tracing::debug!(path = %req.uri().path(), "rejected unauthenticated request");
            code.to_http_response("unauthorized").into_response()
        }
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
