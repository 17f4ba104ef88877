//! Tests for the metrics endpoint

use super::metrics::*;
use crate::prober::Aggregator;
use crate::server::shutdown_channel;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let base = format!("http://{}", listener.local_addr().expect("local addr"));
    (listener, base)
}

/// Test that /metrics returns the probe counters in Prometheus format
#[tokio::test]
async fn test_metrics_exposes_counters() {
    // ARRANGE: Counters with one success and one error
    let aggregator = Arc::new(Aggregator::new().expect("registry should build"));
    aggregator.increment_success("c1", "p1");
    aggregator.increment_error();

    let (listener, base) = bind().await;
    let (controller, signal) = shutdown_channel();
    let server = tokio::spawn(run_metrics_server(
        listener,
        aggregator.clone(),
        signal,
        Duration::from_secs(1),
    ));

    // ACT
    let response = reqwest::get(format!("{}/metrics", base))
        .await
        .expect("Failed to connect to metrics server");

    // ASSERT
    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = response.text().await.expect("body should be text");
    assert!(body.contains(r#"rollprobe_requests{cluster="c1",pod="p1"} 1"#));
    assert!(body.contains("rollprobe_errors 1"));

    controller.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .expect("server should stop after cancellation")
        .expect("server task should not panic");
    assert!(result.is_ok(), "cancelled listener is a clean stop");
}

/// Test that scrapes are counted by status code
#[tokio::test]
async fn test_metrics_counts_scrapes() {
    let aggregator = Arc::new(Aggregator::new().expect("registry should build"));
    let (listener, base) = bind().await;
    let (controller, signal) = shutdown_channel();
    let server = tokio::spawn(run_metrics_server(
        listener,
        aggregator.clone(),
        signal,
        Duration::from_secs(1),
    ));

    for _ in 0..2 {
        reqwest::get(format!("{}/metrics", base))
            .await
            .expect("Failed to connect to metrics server");
    }

    let body = aggregator.encode().expect("encode should succeed");
    assert!(body.contains(r#"rollprobe_metric_handler_requests_total{code="200"} 2"#));

    controller.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(2), server).await;
}

/// Test that unknown paths are not served
#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let aggregator = Arc::new(Aggregator::new().expect("registry should build"));
    let (listener, base) = bind().await;
    let (controller, signal) = shutdown_channel();
    let server = tokio::spawn(run_metrics_server(
        listener,
        aggregator,
        signal,
        Duration::from_secs(1),
    ));

    for path in ["healthz", "nope"] {
        let response = reqwest::get(format!("{}/{}", base, path))
            .await
            .expect("Failed to connect to metrics server");
        assert_eq!(response.status(), 404, "/{} should not exist", path);
    }

    controller.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(2), server).await;
}

/// Test that a scrape sees itself in the in-flight gauge
#[tokio::test]
async fn test_metrics_reports_scrapes_in_flight() {
    let aggregator = Arc::new(Aggregator::new().expect("registry should build"));
    let (listener, base) = bind().await;
    let (controller, signal) = shutdown_channel();
    let server = tokio::spawn(run_metrics_server(
        listener,
        aggregator.clone(),
        signal,
        Duration::from_secs(1),
    ));

    let body = reqwest::get(format!("{}/metrics", base))
        .await
        .expect("Failed to connect to metrics server")
        .text()
        .await
        .expect("body should be text");

    assert!(body.contains("rollprobe_metric_handler_requests_in_flight 1"));
    assert_eq!(aggregator.scrapes_in_flight(), 0, "gauge drops once the scrape ends");

    controller.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(2), server).await;
}
