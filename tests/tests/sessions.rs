//! Session lifecycle through the HTTP surface.

use axum::http::StatusCode;
use integration_tests::{fixtures, setup::TestContext};
use serde_json::Value;

const T0: i64 = 1_700_000_000_000;

async fn ingest(ctx: &TestContext, device_id: &str, timestamp: i64) {
    ctx.server
        .post(&format!("/api/devices/{}/sensor-data", device_id))
        .json(&fixtures::flat_sample(timestamp))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_close_persists_session() {
    let ctx = TestContext::new().await;
    for i in 0..4 {
        ingest(&ctx, "dev-1", T0 + i * 1_000).await;
    }

    let response = ctx
        .server
        .post("/api/devices/dev-1/session/close")
        .add_header("Authorization", fixtures::bearer())
        .await;
    response.assert_status_ok();

    let closed: Value = response.json();
    assert_eq!(closed["status"], "completed");
    assert_eq!(closed["close_reason"], "requested");
    assert_eq!(closed["total_compressions"], 4);
    assert_eq!(closed["average_rate"], 110.0);
    assert_eq!(closed["quality_score"], 1.0);
    assert_eq!(closed["duration"], 3);

    ctx.flush().await;
    let session_id = closed["id"].as_str().unwrap();

    let stored: Value = ctx
        .server
        .get(&format!("/api/sessions/{}", session_id))
        .add_header("Authorization", fixtures::bearer())
        .await
        .json();
    assert_eq!(stored, closed);

    // Nothing left open
    ctx.server
        .get("/api/devices/dev-1/session")
        .add_header("Authorization", fixtures::bearer())
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_close_without_session_returns_404() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/api/devices/dev-1/session/close")
        .add_header("Authorization", fixtures::bearer())
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_unknown_session_returns_404() {
    let ctx = TestContext::new().await;

    for id in ["not-a-uuid", "2f7b1c8e-4a3d-4d3e-9a55-0c1d2e3f4a5b"] {
        ctx.server
            .get(&format!("/api/sessions/{}", id))
            .add_header("Authorization", fixtures::bearer())
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn test_analytics_overview() {
    let ctx = TestContext::new().await;

    // Two closed sessions on different devices, one still open
    ingest(&ctx, "dev-1", T0).await;
    ingest(&ctx, "dev-1", T0 + 1_000).await;
    ingest(&ctx, "dev-2", T0).await;
    ingest(&ctx, "dev-3", T0).await;

    for device in ["dev-1", "dev-2"] {
        ctx.server
            .post(&format!("/api/devices/{}/session/close", device))
            .add_header("Authorization", fixtures::bearer())
            .await
            .assert_status_ok();
    }
    ctx.flush().await;

    let overview: Value = ctx
        .server
        .get("/api/sessions/analytics/overview")
        .add_header("Authorization", fixtures::bearer())
        .await
        .json();

    assert_eq!(overview["total_sessions"], 2);
    assert_eq!(overview["active_sessions"], 1);
    assert_eq!(overview["average_compressions"], 1.5);
    assert_eq!(overview["average_quality"], 1.0);

    let listed: Vec<Value> = ctx
        .server
        .get("/api/sessions")
        .add_query_param("limit", 1)
        .add_header("Authorization", fixtures::bearer())
        .await
        .json();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_analytics_overview_empty() {
    let ctx = TestContext::new().await;

    let overview: Value = ctx
        .server
        .get("/api/sessions/analytics/overview")
        .add_header("Authorization", fixtures::bearer())
        .await
        .json();

    assert_eq!(overview["total_sessions"], 0);
    assert_eq!(overview["average_quality"], 0.0);
}
