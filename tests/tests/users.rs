//! User-facing read endpoints: settings, identity and latest readings.

use axum::http::StatusCode;
use integration_tests::{fixtures, setup::TestContext};
use serde_json::{json, Value};

const T0: i64 = 1_700_000_000_000;

#[tokio::test]
async fn test_auth_user() {
    let ctx = TestContext::new().await;

    let body: Value = ctx
        .server
        .get("/api/auth/user")
        .add_header("Authorization", fixtures::bearer())
        .await
        .json();

    assert_eq!(body, json!({ "uid": fixtures::TEST_UID, "authenticated": true }));
}

#[tokio::test]
async fn test_settings_merge() {
    let ctx = TestContext::new().await;

    let empty: Value = ctx
        .server
        .get("/api/settings")
        .add_header("Authorization", fixtures::bearer())
        .await
        .json();
    assert_eq!(empty, json!({}));

    for patch in [json!({ "units": "metric", "alerts": true }), json!({ "alerts": false })] {
        let response = ctx
            .server
            .put("/api/settings")
            .add_header("Authorization", fixtures::bearer())
            .json(&patch)
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["message"], "Settings updated");
    }

    let settings: Value = ctx
        .server
        .get("/api/settings")
        .add_header("Authorization", fixtures::bearer())
        .await
        .json();
    assert_eq!(settings, json!({ "units": "metric", "alerts": false }));

    let stored = ctx.stored(&format!("users/{}", fixtures::TEST_UID)).await;
    assert_eq!(stored, Some(settings));
}

#[tokio::test]
async fn test_empty_settings_rejected() {
    let ctx = TestContext::new().await;

    ctx.server
        .put("/api/settings")
        .add_header("Authorization", fixtures::bearer())
        .json(&json!({}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_latest_sample() {
    let ctx = TestContext::new().await;

    for (device, ts) in [("dev-1", T0), ("dev-1", T0 + 1_000), ("dev-2", T0 + 2_000)] {
        ctx.server
            .post(&format!("/api/devices/{}/sensor-data", device))
            .json(&fixtures::flat_sample(ts))
            .await
            .assert_status_ok();
    }
    ctx.flush().await;

    let latest: Value = ctx
        .server
        .get("/api/iot/latest")
        .add_query_param("device_id", "dev-1")
        .add_header("Authorization", fixtures::bearer())
        .await
        .json();
    assert_eq!(latest["device_id"], "dev-1");
    assert_eq!(latest["timestamp"], T0 + 1_000);
}

#[tokio::test]
async fn test_latest_sample_errors() {
    let ctx = TestContext::new().await;

    ctx.server
        .get("/api/iot/latest")
        .add_header("Authorization", fixtures::bearer())
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    ctx.server
        .get("/api/iot/latest")
        .add_query_param("device_id", "dev-unknown")
        .add_header("Authorization", fixtures::bearer())
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
