// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resilient client for the remote tool execution endpoint.
//!
//! Every call gets a per-attempt timeout. Retryable failures (timeouts,
//! connection errors, 5xx, 429) are retried with bounded exponential
//! backoff; everything else fails on the first attempt.

pub mod retry;

use std::future::Future;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::credential::{Credential, NOTION_API_VERSION};

pub use retry::{InvokeError, RetryPolicy};

/// Largest batch accepted by [`ToolClient::execute_batch`].
pub const MAX_BATCH: usize = 10;

/// Timeout of [`ToolClient::health_check`].
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Tools the document service endpoint exposes.
pub const DEFAULT_TOOLS: &[&str] = &[
    "mcp_notionApi_API-post-search",
    "mcp_notionApi_API-post-database-query",
    "mcp_notionApi_API-retrieve-a-page",
    "mcp_notionApi_API-retrieve-a-database",
    "mcp_notionApi_API-get-block-children",
    "mcp_notionApi_API-patch-page",
    "mcp_notionApi_API-post-page",
    "mcp_notionApi_API-create-a-database",
    "mcp_notionApi_API-update-a-database",
    "mcp_notionApi_API-get-users",
    "mcp_notionApi_API-get-user",
    "mcp_notionApi_API-get-self",
];

/// Client configuration.
#[derive(Debug, Clone)]
pub struct InvokeConfig {
    pub base_url: String,
    /// Per-attempt timeout.
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Sent as `auth.version` with every call.
    pub api_version: String,
    /// Accepted tool names. Empty accepts any tool.
    pub tools: Vec<String>,
}

impl InvokeConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            api_version: NOTION_API_VERSION.to_owned(),
            tools: DEFAULT_TOOLS.iter().map(|t| (*t).to_owned()).collect(),
        }
    }
}

/// A call that failed after all attempts.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed after {attempts} attempt(s) in {elapsed:?}: {source}")]
pub struct InvokeFailure {
    pub operation: String,
    /// 0 when the call was rejected before reaching the network.
    pub attempts: u32,
    pub elapsed: Duration,
    #[source]
    pub source: InvokeError,
}

impl InvokeFailure {
    fn rejected(operation: &str, source: InvokeError) -> Self {
        Self { operation: operation.to_owned(), attempts: 0, elapsed: Duration::ZERO, source }
    }
}

/// One call of a batch.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub tool: String,
    pub arguments: Value,
    pub credential: Credential,
}

/// A tool advertised by the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Serialize)]
struct CallAuth<'a> {
    token: &'a str,
    version: &'a str,
}

#[derive(Serialize)]
struct CallBody<'a> {
    tool: &'a str,
    arguments: &'a Value,
    auth: CallAuth<'a>,
}

#[derive(Serialize)]
struct BatchBody<'a> {
    requests: Vec<CallBody<'a>>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<RemoteError>,
}

#[derive(Deserialize)]
struct RemoteError {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

impl<T> Envelope<T> {
    fn into_result(self) -> Result<Option<T>, InvokeError> {
        if self.success {
            return Ok(self.data);
        }
        let (message, code) = match self.error {
            Some(e) => (e.message, e.code),
            None => ("tool reported failure".to_owned(), None),
        };
        Err(InvokeError::ToolFailed { message, code })
    }
}

#[derive(Deserialize)]
struct BatchData {
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Deserialize)]
struct CatalogData {
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
}

#[derive(Deserialize)]
struct HealthBody {
    #[serde(default)]
    status: String,
}

/// HTTP client for the tool execution endpoint.
pub struct ToolClient {
    config: InvokeConfig,
    client: reqwest::Client,
}

impl ToolClient {
    pub fn new(config: InvokeConfig) -> Self {
        crate::ensure_crypto_provider();
        let client = reqwest::Client::builder()
            .user_agent(concat!("docgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    pub fn config(&self) -> &InvokeConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn is_supported(&self, tool: &str) -> bool {
        self.config.tools.is_empty() || self.config.tools.iter().any(|t| t == tool)
    }

    fn call_body<'a>(&'a self, tool: &'a str, arguments: &'a Value, credential: &'a Credential) -> CallBody<'a> {
        CallBody {
            tool,
            arguments,
            auth: CallAuth { token: &credential.access_token, version: &self.config.api_version },
        }
    }

    /// Execute one tool with the given credential.
    pub async fn execute(
        &self,
        tool: &str,
        arguments: &Value,
        credential: &Credential,
    ) -> Result<Value, InvokeFailure> {
        if !self.is_supported(tool) {
            return Err(InvokeFailure::rejected(tool, InvokeError::UnsupportedTool(tool.to_owned())));
        }
        let body = &self.call_body(tool, arguments, credential);
        let timeout = self.config.timeout;
        self.with_retries(tool, move || async move {
            let req = self.client.post(self.url("/mcp/execute")).json(body);
            let envelope: Envelope<Value> = self.send(req, timeout).await?;
            Ok::<_, InvokeError>(envelope.into_result()?.unwrap_or(Value::Null))
        })
        .await
    }

    /// Execute up to [`MAX_BATCH`] calls concurrently. Results keep input order.
    pub async fn execute_batch(
        &self,
        requests: &[ToolRequest],
    ) -> Result<Vec<Result<Value, InvokeFailure>>, InvokeFailure> {
        check_batch(requests.len())?;
        let calls = requests.iter().map(|r| self.execute(&r.tool, &r.arguments, &r.credential));
        Ok(futures_util::future::join_all(calls).await)
    }

    /// Send up to [`MAX_BATCH`] calls as one `/mcp/batch` request with a
    /// doubled timeout.
    pub async fn execute_remote_batch(
        &self,
        requests: &[ToolRequest],
    ) -> Result<Vec<Value>, InvokeFailure> {
        check_batch(requests.len())?;
        if let Some(r) = requests.iter().find(|r| !self.is_supported(&r.tool)) {
            return Err(InvokeFailure::rejected("batch", InvokeError::UnsupportedTool(r.tool.clone())));
        }
        let body = &BatchBody {
            requests: requests
                .iter()
                .map(|r| self.call_body(&r.tool, &r.arguments, &r.credential))
                .collect(),
        };
        let timeout = self.config.timeout.saturating_mul(2);
        self.with_retries("batch", move || async move {
            let req = self.client.post(self.url("/mcp/batch")).json(body);
            let envelope: Envelope<BatchData> = self.send(req, timeout).await?;
            Ok::<_, InvokeError>(envelope.into_result()?.map(|d| d.results).unwrap_or_default())
        })
        .await
    }

    /// Tools advertised by the endpoint. A failure envelope yields no tools.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, InvokeFailure> {
        let timeout = self.config.timeout;
        self.with_retries("list_tools", move || async move {
            let req = self.client.get(self.url("/tools"));
            let envelope: Envelope<CatalogData> = self.send(req, timeout).await?;
            Ok::<_, InvokeError>(envelope.into_result().ok().flatten().map(|d| d.tools).unwrap_or_default())
        })
        .await
    }

    /// Whether the endpoint reports `status: "ok"`. Never errors.
    pub async fn health_check(&self) -> bool {
        let req = self.client.get(self.url("/health"));
        match self.send::<HealthBody>(req, HEALTH_TIMEOUT).await {
            Ok(body) => body.status == "ok",
            Err(e) => {
                tracing::debug!(err = %e, "tool endpoint health check failed");
                false
            }
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<T, InvokeError> {
        let resp = req.timeout(timeout).send().await.map_err(InvokeError::from_transport)?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(InvokeError::from_status(status.as_u16(), &text));
        }
        let bytes = resp.bytes().await.map_err(InvokeError::from_transport)?;
        serde_json::from_slice(&bytes).map_err(|e| InvokeError::MalformedResponse(e.to_string()))
    }

    async fn with_retries<T, F, Fut>(&self, operation: &str, mut attempt_fn: F) -> Result<T, InvokeFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, InvokeError>>,
    {
        let policy = self.config.retry;
        let started = Instant::now();
        let mut attempt = 1;
        loop {
            match attempt_fn().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(operation, attempt, "tool call recovered");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt <= policy.max_retries => {
                    let delay = policy.delay_for(attempt);
                    tracing::debug!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        err = %e,
                        "tool call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(operation, attempt, err = %e, "tool call failed");
                    return Err(InvokeFailure {
                        operation: operation.to_owned(),
                        attempts: attempt,
                        elapsed: started.elapsed(),
                        source: e,
                    });
                }
            }
        }
    }
}

fn check_batch(size: usize) -> Result<(), InvokeFailure> {
    if size > MAX_BATCH {
        return Err(InvokeFailure::rejected("batch", InvokeError::BatchTooLarge { size, limit: MAX_BATCH }));
    }
    Ok(())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
