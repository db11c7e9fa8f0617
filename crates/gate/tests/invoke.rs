// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool client behaviour against a mock tool endpoint.

use std::time::{Duration, Instant};

use docgate::credential::Credential;
use docgate::invoke::{InvokeConfig, InvokeError, RetryPolicy, ToolClient, ToolRequest};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEARCH: &str = "mcp_notionApi_API-post-search";

fn client(server: &MockServer) -> ToolClient {
    ToolClient::new(InvokeConfig::new(server.uri()))
}

/// Same classification as the default policy with millisecond delays.
fn fast_client(server: &MockServer) -> ToolClient {
    let mut config = InvokeConfig::new(server.uri());
    config.retry = RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
    };
    ToolClient::new(config)
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.map(|r| r.len()).unwrap_or(0)
}

fn ok_body(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": data }))
}

#[tokio::test]
async fn execute_sends_tool_arguments_and_auth() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp/execute"))
        .and(body_partial_json(json!({
            "tool": SEARCH,
            "arguments": { "query": "Q3 plan" },
            "auth": { "token": "tok-1", "version": "2022-06-28" },
        })))
        .respond_with(ok_body(json!({ "results": [1, 2] })))
        .expect(1)
        .mount(&server)
        .await;

    let value =
        client(&server).execute(SEARCH, &json!({ "query": "Q3 plan" }), &Credential::bearer("tok-1")).await?;
    assert_eq!(value, json!({ "results": [1, 2] }));
    Ok(())
}

#[tokio::test]
async fn retries_server_errors_with_backoff() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp/execute"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp/execute"))
        .respond_with(ok_body(json!("done")))
        .mount(&server)
        .await;

    let started = Instant::now();
    let value = client(&server).execute(SEARCH, &json!({}), &Credential::bearer("t")).await?;
    let elapsed = started.elapsed();

    assert_eq!(value, json!("done"));
    assert_eq!(request_count(&server).await, 3);
    // 1000 ms after the first failure, 2000 ms after the second.
    assert!(elapsed >= Duration::from_millis(2900), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(6000), "elapsed {elapsed:?}");
    Ok(())
}

#[tokio::test]
async fn client_errors_fail_without_retry() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp/execute"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such route"))
        .mount(&server)
        .await;

    let err = client(&server)
        .execute(SEARCH, &json!({}), &Credential::bearer("t"))
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected failure"))?;
    assert_eq!(err.attempts, 1);
    assert!(matches!(err.source, InvokeError::RemoteClient { status: 404, .. }));
    assert_eq!(request_count(&server).await, 1);
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_report_attempts() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp/execute"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = fast_client(&server)
        .execute(SEARCH, &json!({}), &Credential::bearer("t"))
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected failure"))?;
    assert_eq!(err.attempts, 3);
    assert!(matches!(err.source, InvokeError::RateLimited));
    assert_eq!(request_count(&server).await, 3);
    Ok(())
}

#[tokio::test]
async fn timeouts_are_retried() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp/execute"))
        .respond_with(ok_body(json!(null)).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let mut config = InvokeConfig::new(server.uri());
    config.timeout = Duration::from_millis(50);
    config.retry = RetryPolicy {
        max_retries: 1,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(10),
    };
    let err = ToolClient::new(config)
        .execute(SEARCH, &json!({}), &Credential::bearer("t"))
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected timeout"))?;
    assert_eq!(err.attempts, 2);
    assert!(matches!(err.source, InvokeError::TransientNetwork(_)));
    Ok(())
}

#[tokio::test]
async fn tool_failure_is_not_retried() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp/execute"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error": { "message": "page not shared", "code": "object_not_found" },
        })))
        .mount(&server)
        .await;

    let err = fast_client(&server)
        .execute(SEARCH, &json!({}), &Credential::bearer("t"))
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected failure"))?;
    match err.source {
        InvokeError::ToolFailed { ref message, ref code } => {
            assert_eq!(message, "page not shared");
            assert_eq!(code.as_deref(), Some("object_not_found"));
        }
        ref other => anyhow::bail!("unexpected error: {other}"),
    }
    assert_eq!(request_count(&server).await, 1);
    Ok(())
}

#[tokio::test]
async fn malformed_body_is_not_retried() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp/execute"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = fast_client(&server)
        .execute(SEARCH, &json!({}), &Credential::bearer("t"))
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected failure"))?;
    assert!(matches!(err.source, InvokeError::MalformedResponse(_)));
    assert_eq!(request_count(&server).await, 1);
    Ok(())
}

#[tokio::test]
async fn unsupported_tool_never_reaches_network() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let err = client(&server)
        .execute("drop-all-pages", &json!({}), &Credential::bearer("t"))
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected rejection"))?;
    assert_eq!(err.attempts, 0);
    assert!(matches!(err.source, InvokeError::UnsupportedTool(_)));
    assert_eq!(request_count(&server).await, 0);
    Ok(())
}

fn batch(n: usize) -> Vec<ToolRequest> {
    (0..n)
        .map(|i| ToolRequest {
            tool: SEARCH.to_owned(),
            arguments: json!({ "query": format!("q{i}") }),
            credential: Credential::bearer("t"),
        })
        .collect()
}

#[tokio::test]
async fn oversized_batch_is_rejected_before_network() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let tools = client(&server);

    let err = tools.execute_batch(&batch(11)).await.err().ok_or_else(|| anyhow::anyhow!("expected rejection"))?;
    assert!(matches!(err.source, InvokeError::BatchTooLarge { size: 11, limit: 10 }));
    let err =
        tools.execute_remote_batch(&batch(11)).await.err().ok_or_else(|| anyhow::anyhow!("expected rejection"))?;
    assert!(matches!(err.source, InvokeError::BatchTooLarge { .. }));

    assert_eq!(request_count(&server).await, 0);
    Ok(())
}

#[tokio::test]
async fn batch_results_keep_input_order() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    for i in 0..3 {
        Mock::given(method("POST"))
            .and(path("/mcp/execute"))
            .and(body_partial_json(json!({ "arguments": { "query": format!("q{i}") } })))
            .respond_with(ok_body(json!(i)).set_delay(Duration::from_millis(30 * (3 - i))))
            .mount(&server)
            .await;
    }

    let results = client(&server).execute_batch(&batch(3)).await?;
    let values: Vec<serde_json::Value> = results.into_iter().collect::<Result<_, _>>()?;
    assert_eq!(values, vec![json!(0), json!(1), json!(2)]);
    Ok(())
}

#[tokio::test]
async fn remote_batch_posts_once() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp/batch"))
        .respond_with(ok_body(json!({ "results": ["a", "b"] })))
        .expect(1)
        .mount(&server)
        .await;

    let results = client(&server).execute_remote_batch(&batch(2)).await?;
    assert_eq!(results, vec![json!("a"), json!("b")]);
    Ok(())
}

#[tokio::test]
async fn list_tools_reads_catalog() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ok_body(json!({
            "tools": [{ "name": SEARCH, "description": "Search pages" }],
            "count": 1,
        })))
        .mount(&server)
        .await;

    let tools = client(&server).list_tools().await?;
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, SEARCH);
    assert_eq!(tools[0].description, "Search pages");
    Ok(())
}

#[tokio::test]
async fn health_check_requires_ok_status() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "degraded" })))
        .mount(&server)
        .await;

    let tools = client(&server);
    assert!(tools.health_check().await);
    assert!(!tools.health_check().await);
    Ok(())
}

#[tokio::test]
async fn health_check_is_false_when_unreachable() {
    let tools = ToolClient::new(InvokeConfig::new("http://127.0.0.1:9"));
    assert!(!tools.health_check().await);
}
