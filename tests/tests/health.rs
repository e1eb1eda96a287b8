//! Tests for health check and metrics endpoints.

use axum::http::StatusCode;
use integration_tests::{fixtures, setup::TestContext};
use serde_json::Value;

/// Test /health endpoint returns proper structure
#[tokio::test]
async fn test_health_endpoint_structure() {
    let ctx = TestContext::new().await;

    let response = ctx.server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    for field in [
        "status",
        "store_connected",
        "auth_connected",
        "active_devices",
        "persist_queue_depth",
    ] {
        assert!(body.get(field).is_some(), "Response should have '{}' field", field);
    }

    let status = body["status"].as_str().unwrap_or("");
    assert!(
        status == "healthy" || status == "degraded" || status == "unhealthy",
        "unexpected status '{}'",
        status
    );
}

/// Test /health counts devices with a worker
#[tokio::test]
async fn test_health_counts_devices() {
    let ctx = TestContext::new().await;

    ctx.server
        .post("/api/devices/dev-1/sensor-data")
        .json(&fixtures::flat_sample(1_700_000_000_000))
        .await
        .assert_status_ok();

    let body: Value = ctx.server.get("/health").await.json();
    assert_eq!(body["active_devices"], 1);
    assert_eq!(body["store_connected"], true);
}

/// Test liveness and readiness checks
#[tokio::test]
async fn test_liveness_and_readiness() {
    let ctx = TestContext::new().await;

    ctx.server
        .get("/health/live")
        .await
        .assert_status(StatusCode::OK);
    ctx.server
        .get("/health/ready")
        .await
        .assert_status(StatusCode::OK);
}

/// Test /metrics exposes ingest counters
#[tokio::test]
async fn test_metrics_snapshot() {
    let ctx = TestContext::new().await;

    ctx.server
        .post("/api/devices/dev-1/sensor-data")
        .json(&fixtures::flat_sample(1_700_000_000_000))
        .await
        .assert_status_ok();

    let body: Value = ctx.server.get("/metrics").await.json();
    assert!(body["samples_received"].as_u64().unwrap() >= 1);
    assert!(body["samples_accepted"].as_u64().is_some());
    assert!(body.get("persist_queue_depth").is_some());
}
