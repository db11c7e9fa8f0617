// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::invoke::{InvokeError, InvokeFailure};
use crate::store::StoreError;

/// Errors from the account and handshake lifecycle. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid or unknown authorization session")]
    InvalidSession,
    #[error("authorization session expired")]
    SessionExpired,
    #[error("authorization state mismatch")]
    StateMismatch,
    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("no active account")]
    NoActiveAccount,
    #[error("credential expired for {0}, re-authorization required")]
    CredentialExpired(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider {provider} misconfigured: {reason}")]
    ProviderMisconfigured { provider: String, reason: String },
    #[error("token exchange failed: {0}")]
    Exchange(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    pub fn code(&self) -> GateError {
        match self {
            Self::InvalidSession
            | Self::SessionExpired
            | Self::StateMismatch
            | Self::AuthorizationDenied(_)
            | Self::UnknownProvider(_) => GateError::BadRequest,
            Self::AccountNotFound(_) => GateError::AccountNotFound,
            Self::NoActiveAccount => GateError::NoActiveAccount,
            Self::CredentialExpired(_) => GateError::ReauthRequired,
            Self::Exchange(_) => GateError::UpstreamError,
            Self::ProviderMisconfigured { .. } | Self::Store(_) => GateError::Internal,
        }
    }
}

impl InvokeFailure {
    pub fn code(&self) -> GateError {
        match self.source {
            InvokeError::UnsupportedTool(_) | InvokeError::BatchTooLarge { .. } => {
                GateError::BadRequest
            }
            InvokeError::RateLimited => GateError::RateLimited,
            _ => GateError::UpstreamError,
        }
    }
}

/// Error codes for the gateway API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateError {
    Unauthorized,
    BadRequest,
    AccountNotFound,
    NoActiveAccount,
    ReauthRequired,
    RateLimited,
    UpstreamError,
    Internal,
}

impl GateError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::AccountNotFound => 404,
            Self::NoActiveAccount => 409,
            Self::ReauthRequired => 401,
            Self::RateLimited => 429,
            Self::UpstreamError => 502,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::AccountNotFound => "ACCOUNT_NOT_FOUND",
            Self::NoActiveAccount => "NO_ACTIVE_ACCOUNT",
            Self::ReauthRequired => "REAUTH_REQUIRED",
            Self::RateLimited => "RATE_LIMITED",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
