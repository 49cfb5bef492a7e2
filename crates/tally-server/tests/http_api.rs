mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use common::{
    build_context_with, build_test_context, counter_batch_body, request_json, request_no_body,
    request_raw, sqlite_config,
};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::json;
use std::io::{Read, Write};
use tower::util::ServiceExt;

#[tokio::test]
async fn path_updates_accumulate_counters_and_replace_gauges() {
    let ctx = build_test_context().await.unwrap();

    for uri in ["/update/counter/PollCount/3", "/update/counter/PollCount/4"] {
        let (status, _, trace) = request_no_body(&ctx.app, "POST", uri).await;
        assert_eq!(status, StatusCode::OK);
        assert!(trace.is_some());
    }
    for uri in ["/update/gauge/Alloc/1.5", "/update/gauge/Alloc/2.5"] {
        let (status, _, _) = request_no_body(&ctx.app, "POST", uri).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/value/counter/PollCount").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(7));

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/value/gauge/Alloc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(2.5));
}

#[tokio::test]
async fn path_update_rejects_bad_kind_and_value() {
    let ctx = build_test_context().await.unwrap();

    let (status, body, trace) = request_no_body(&ctx.app, "POST", "/update/histogram/x/1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["err_code"], 1001);
    assert_eq!(body["trace_id"].as_str(), trace.as_deref());

    let (status, _, _) = request_no_body(&ctx.app, "POST", "/update/counter/x/1.5").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = request_no_body(&ctx.app, "POST", "/update/gauge/x/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn json_update_returns_current_value() {
    let ctx = build_test_context().await.unwrap();

    let first = json!({"id":"Hits","type":"counter","delta":5});
    request_json(&ctx.app, "POST", "/update", first).await;
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/update",
        json!({"id":"Hits","type":"counter","delta":2}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"id":"Hits","type":"counter","delta":7}));

    let (status, body, _) =
        request_json(&ctx.app, "POST", "/value", json!({"id":"Hits","type":"counter"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["delta"], 7);
}

#[tokio::test]
async fn json_update_with_missing_field_is_rejected() {
    let ctx = build_test_context().await.unwrap();

    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/update",
        json!({"id":"Hits","type":"counter","value":1.0}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) =
        request_json(&ctx.app, "POST", "/value", json!({"id":"Hits","type":"counter"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn batch_update_is_all_or_nothing() {
    let ctx = build_test_context().await.unwrap();

    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/updates/",
        json!([
            {"id":"PollCount","type":"counter","delta":1},
            {"id":"Alloc","type":"gauge","value":10.0}
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/updates/",
        json!([
            {"id":"PollCount","type":"counter","delta":100},
            {"id":"x","type":"counter","value":1.0}
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["err_msg"].as_str().unwrap().contains("#1"));

    let (_, body, _) = request_no_body(&ctx.app, "GET", "/value/counter/PollCount").await;
    assert_eq!(body, json!(1));
}

#[tokio::test]
async fn missing_values_are_not_found() {
    let ctx = build_test_context().await.unwrap();

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/value/gauge/Nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["err_code"], 1004);

    let (status, _, _) = request_no_body(&ctx.app, "GET", "/value/histogram/Nope").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ping_and_listing() {
    let ctx = build_test_context().await.unwrap();

    let (status, _, _) = request_no_body(&ctx.app, "GET", "/ping").await;
    assert_eq!(status, StatusCode::OK);

    request_no_body(&ctx.app, "POST", "/update/counter/b/1").await;
    request_no_body(&ctx.app, "POST", "/update/counter/a/2").await;
    request_no_body(&ctx.app, "POST", "/update/gauge/g/0.5").await;

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"counters": {"a": 2, "b": 1}, "gauges": {"g": 0.5}})
    );
}

#[tokio::test]
async fn sqlite_backend_serves_the_same_routes() {
    let dir = tempfile::tempdir().unwrap();
    let config = sqlite_config(&dir);
    let ctx = build_context_with(dir, config).await.unwrap();
    assert!(ctx.persistence.is_none());

    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/updates/",
        json!([
            {"id":"PollCount","type":"counter","delta":2},
            {"id":"PollCount","type":"counter","delta":3},
            {"id":"Alloc","type":"gauge","value":1.0},
            {"id":"Alloc","type":"gauge","value":4.0}
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body, _) = request_no_body(&ctx.app, "GET", "/metrics").await;
    assert_eq!(
        body,
        json!({"counters": {"PollCount": 5}, "gauges": {"Alloc": 4.0}})
    );

    let (status, _, _) = request_no_body(&ctx.app, "GET", "/ping").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_kind_in_json_body_is_a_bad_request() {
    let ctx = build_test_context().await.unwrap();

    let (status, body, trace) = request_json(
        &ctx.app,
        "POST",
        "/updates/",
        json!([{"id":"x","type":"histogram","value":1.0}]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["err_code"], 1001);
    assert_eq!(body["trace_id"].as_str(), trace.as_deref());
    assert!(body["err_msg"].as_str().unwrap().contains("histogram"));

    for uri in ["/update", "/value"] {
        let (status, body, _) =
            request_json(&ctx.app, "POST", uri, json!({"id":"x","type":"histogram","value":1.0}))
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["err_code"], 1001, "{uri}");
    }

    let (status, body, _) = request_raw(&ctx.app, "/update", &[], b"{not json".to_vec()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["err_code"], 1001);
}

#[tokio::test]
async fn oversized_body_is_payload_too_large() {
    let ctx = build_test_context().await.unwrap();

    // ~5.5 MiB of otherwise valid records.
    let (status, body, trace) =
        request_raw(&ctx.app, "/updates/", &[], counter_batch_body(120_000)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["err_code"], 1013);
    assert_eq!(body["trace_id"].as_str(), trace.as_deref());
    assert!(ctx.store.counter("PollCount").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn large_batch_under_the_limit_is_stored() {
    let ctx = build_test_context().await.unwrap();

    // ~3.2 MiB, above axum's 2 MiB extractor default.
    let (status, _, _) = request_raw(&ctx.app, "/updates/", &[], counter_batch_body(70_000)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ctx.store.counter("PollCount").await.unwrap(), 70_000);
}

#[tokio::test]
async fn gzip_request_body_is_inflated() {
    let ctx = build_test_context().await.unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&counter_batch_body(3)).unwrap();
    let compressed = encoder.finish().unwrap();

    let (status, _, _) = request_raw(
        &ctx.app,
        "/updates/",
        &[("Content-Encoding", "gzip")],
        compressed,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ctx.store.counter("PollCount").await.unwrap(), 3);
}

#[tokio::test]
async fn responses_are_gzipped_when_accepted() {
    let ctx = build_test_context().await.unwrap();
    request_no_body(&ctx.app, "POST", "/update/counter/PollCount/2").await;
    request_no_body(&ctx.app, "POST", "/update/gauge/Alloc/1.5").await;

    let req = Request::builder()
        .method("GET")
        .uri("/metrics")
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(Body::empty())
        .unwrap();
    let resp = ctx.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_ENCODING], "gzip");

    let compressed = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let mut text = String::new();
    GzDecoder::new(&compressed[..]).read_to_string(&mut text).unwrap();
    let body: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        body,
        json!({"counters": {"PollCount": 2}, "gauges": {"Alloc": 1.5}})
    );
}
