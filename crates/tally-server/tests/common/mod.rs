#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tally_server::app;
use tally_server::config::ServerConfig;
use tally_server::persistence::PersistenceScheduler;
use tally_server::service::MetricsService;
use tally_server::state::{build_store, AppState};
use tally_storage::MetricStore;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub store: Arc<dyn MetricStore>,
    pub persistence: Option<Arc<PersistenceScheduler>>,
    pub app: axum::Router,
}

/// Snapshot path inside `dir`, scheduled every `store_interval_secs`.
pub fn file_config(dir: &TempDir, store_interval_secs: u64) -> ServerConfig {
    ServerConfig {
        file_storage_path: Some(dir.path().join("metrics.json").display().to_string()),
        store_interval_secs,
        ..ServerConfig::default()
    }
}

pub fn sqlite_config(dir: &TempDir) -> ServerConfig {
    ServerConfig {
        database_path: Some(dir.path().join("metrics.db").display().to_string()),
        ..file_config(dir, 300)
    }
}

pub async fn build_context_with(
    temp_dir: TempDir,
    config: ServerConfig,
) -> Result<TestContext> {
    let (store, persistence) = build_store(&config, CancellationToken::new()).await?;
    let state = AppState::new(MetricsService::new(
        Arc::clone(&store),
        persistence.clone(),
    ));
    let app = app::build_http_app(state.clone());

    Ok(TestContext {
        temp_dir,
        state,
        store,
        persistence,
        app,
    })
}

/// File snapshot backend with a long interval, so no write persists by itself.
pub async fn build_test_context() -> Result<TestContext> {
    let temp_dir = tempfile::tempdir()?;
    let config = file_config(&temp_dir, 300);
    build_context_with(temp_dir, config).await
}

pub async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value, Option<String>) {
    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    let status = resp.status();
    let trace_id = resp
        .headers()
        .get("x-trace-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, json, trace_id)
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Value,
) -> (StatusCode, Value, Option<String>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build");
    send(app, req).await
}

/// Posts `body` as-is, with extra request headers.
pub async fn request_raw(
    app: &axum::Router,
    uri: &str,
    headers: &[(&str, &str)],
    body: Vec<u8>,
) -> (StatusCode, Value, Option<String>) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let req = builder.body(Body::from(body)).expect("request should build");
    send(app, req).await
}

/// A JSON array of `count` counter records, each adding 1 to `PollCount`.
pub fn counter_batch_body(count: usize) -> Vec<u8> {
    let record = r#"{"id":"PollCount","type":"counter","delta":1}"#;
    let mut body = String::with_capacity(count * (record.len() + 1) + 2);
    body.push('[');
    for i in 0..count {
        if i > 0 {
            body.push(',');
        }
        body.push_str(record);
    }
    body.push(']');
    body.into_bytes()
}

pub async fn request_no_body(
    app: &axum::Router,
    method: &str,
    uri: &str,
) -> (StatusCode, Value, Option<String>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    send(app, req).await
}

/// Serves `app` on an ephemeral local port until `cancel` fires.
pub async fn spawn_server(app: axum::Router, cancel: CancellationToken) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("listener has an address");
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .expect("server should run");
    });
    addr
}

pub fn fast_retry() -> tally_common::retry::RetryPolicy {
    tally_common::retry::RetryPolicy {
        max_attempts: 3,
        backoff_base: Duration::from_millis(10),
        backoff_step: Duration::from_millis(10),
    }
}
