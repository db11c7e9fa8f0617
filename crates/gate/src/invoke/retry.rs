// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry policy and failure classification for remote tool calls.

use std::time::Duration;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    /// Sleep before the retry following failed attempt `attempt` (1-based):
    /// `min(base * 2^(attempt-1), max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Why a remote call failed.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("network error: {0}")]
    TransientNetwork(String),
    #[error("rate limited by tool endpoint")]
    RateLimited,
    #[error("tool endpoint returned {status}")]
    RemoteServer { status: u16 },
    #[error("tool endpoint rejected request ({status}): {message}")]
    RemoteClient { status: u16, message: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("tool failed: {message}")]
    ToolFailed { message: String, code: Option<String> },
    #[error("unsupported tool: {0}")]
    UnsupportedTool(String),
    #[error("batch of {size} exceeds limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },
}

/// Longest slice of an error body kept in [`InvokeError::RemoteClient`].
const MAX_ERROR_BODY: usize = 200;

impl InvokeError {
    /// Timeouts, connection failures, 5xx and 429 are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork(_) | Self::RateLimited | Self::RemoteServer { .. })
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            429 => Self::RateLimited,
            500..=599 => Self::RemoteServer { status },
            _ => {
                let message: String = body.chars().take(MAX_ERROR_BODY).collect();
                Self::RemoteClient { status, message }
            }
        }
    }

    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else if err.is_timeout() {
            Self::TransientNetwork(format!("timed out: {err}"))
        } else {
            Self::TransientNetwork(err.to_string())
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
