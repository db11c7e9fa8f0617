// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;

#[yare::parameterized(
    unauthorized = { GateError::Unauthorized, 401, "UNAUTHORIZED" },
    bad_request = { GateError::BadRequest, 400, "BAD_REQUEST" },
    account_not_found = { GateError::AccountNotFound, 404, "ACCOUNT_NOT_FOUND" },
    no_active_account = { GateError::NoActiveAccount, 409, "NO_ACTIVE_ACCOUNT" },
    reauth_required = { GateError::ReauthRequired, 401, "REAUTH_REQUIRED" },
    rate_limited = { GateError::RateLimited, 429, "RATE_LIMITED" },
    upstream = { GateError::UpstreamError, 502, "UPSTREAM_ERROR" },
    internal = { GateError::Internal, 500, "INTERNAL" },
)]
fn status_and_code(code: GateError, status: u16, name: &str) {
    assert_eq!(code.http_status(), status);
    assert_eq!(code.as_str(), name);
    assert_eq!(code.to_string(), name);
}

#[test]
fn http_response_wraps_envelope() -> anyhow::Result<()> {
    let (status, body) = GateError::NoActiveAccount.to_http_response("pick one");
    assert_eq!(status, StatusCode::CONFLICT);
    let json = serde_json::to_value(&body.0)?;
    assert_eq!(json, serde_json::json!({ "error": { "code": "NO_ACTIVE_ACCOUNT", "message": "pick one" } }));
    Ok(())
}

#[yare::parameterized(
    invalid_session = { AuthError::InvalidSession, GateError::BadRequest },
    state_mismatch = { AuthError::StateMismatch, GateError::BadRequest },
    denied = { AuthError::AuthorizationDenied("access_denied".into()), GateError::BadRequest },
    not_found = { AuthError::AccountNotFound("a1".into()), GateError::AccountNotFound },
    no_active = { AuthError::NoActiveAccount, GateError::NoActiveAccount },
    expired = { AuthError::CredentialExpired("notion:a1".into()), GateError::ReauthRequired },
    exchange = { AuthError::Exchange("400".into()), GateError::UpstreamError },
    misconfigured = {
        AuthError::ProviderMisconfigured { provider: "x".into(), reason: "no token url".into() },
        GateError::Internal
    },
)]
fn auth_error_codes(err: AuthError, expected: GateError) {
    assert_eq!(err.code(), expected);
}

fn failure(source: InvokeError) -> InvokeFailure {
    InvokeFailure {
        operation: "execute".to_owned(),
        attempts: 1,
        elapsed: Duration::from_millis(5),
        source,
    }
}

#[yare::parameterized(
    unsupported = { InvokeError::UnsupportedTool("rm".into()), GateError::BadRequest },
    batch = { InvokeError::BatchTooLarge { size: 11, limit: 10 }, GateError::BadRequest },
    rate_limited = { InvokeError::RateLimited, GateError::RateLimited },
    server = { InvokeError::RemoteServer { status: 503 }, GateError::UpstreamError },
    tool_failed = {
        InvokeError::ToolFailed { message: "boom".into(), code: None },
        GateError::UpstreamError
    },
)]
fn invoke_failure_codes(source: InvokeError, expected: GateError) {
    assert_eq!(failure(source).code(), expected);
}

#[test]
fn invoke_failure_message_names_attempts() {
    let msg = failure(InvokeError::RemoteServer { status: 503 }).to_string();
    assert!(msg.starts_with("execute failed after 1 attempt(s)"), "{msg}");
    assert!(msg.contains("503"), "{msg}");
}
