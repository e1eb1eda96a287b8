//! Tests for error handling in the ingest pipeline.
//!
//! Rejected samples must come back with the right status and code and
//! must leave the device's session untouched.

use axum::http::StatusCode;
use integration_tests::{fixtures, setup::TestContext};
use serde_json::{json, Value};

const T0: i64 = 1_700_000_000_000;

/// Test missing required field returns VALID_001
#[tokio::test]
async fn test_missing_field_returns_400() {
    let ctx = TestContext::new().await;

    let mut sample = fixtures::flat_sample(T0);
    sample.as_object_mut().unwrap().remove("compression_depth");

    let response = ctx
        .server
        .post("/api/devices/dev-1/sensor-data")
        .json(&sample)
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALID_001");
    assert!(ctx.gateway.current_session("dev-1").is_none());
}

/// Test barometric pressure is not scored as compression pressure
#[tokio::test]
async fn test_environment_pressure_does_not_fill_cpr_pressure() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/api/devices/esp32-01/sensor-data")
        .json(&fixtures::firmware_sample_without_force(T0))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALID_001");
    assert_eq!(body["details"][0], "pressure");
    assert!(ctx.gateway.current_session("esp32-01").is_none());
}

/// Test out-of-range rate returns VALID_003
#[tokio::test]
async fn test_out_of_range_returns_400() {
    let ctx = TestContext::new().await;

    let mut sample = fixtures::flat_sample(T0);
    sample["compression_rate"] = json!(300);

    let response = ctx
        .server
        .post("/api/devices/dev-1/sensor-data")
        .json(&sample)
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALID_003");
}

/// Test non-object and unparseable bodies return VALID_004
#[tokio::test]
async fn test_malformed_body_returns_400() {
    let ctx = TestContext::new().await;

    for payload in ["[1, 2, 3]", "{not json", "42"] {
        let response = ctx
            .server
            .post("/api/devices/dev-1/sensor-data")
            .content_type("application/json")
            .bytes(payload.into())
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["code"], "VALID_004", "payload {:?}", payload);
    }
}

/// Test payloads over the size limit are rejected
#[tokio::test]
async fn test_oversized_payload_returns_400() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/api/devices/dev-1/sensor-data")
        .json(&fixtures::oversized_sample(T0))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALID_004");
}

/// Test invalid device ID in the path
#[tokio::test]
async fn test_invalid_device_id_returns_400() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/api/devices/bad%24id/sensor-data")
        .json(&fixtures::flat_sample(T0))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(ctx.gateway.device_count(), 0);
}

/// Test out-of-order sample returns 409 SEQ_001 and leaves the session alone
#[tokio::test]
async fn test_stale_sample_returns_409() {
    let ctx = TestContext::new().await;

    ctx.server
        .post("/api/devices/dev-1/sensor-data")
        .json(&fixtures::flat_sample(T0 + 5_000))
        .await
        .assert_status_ok();
    let before = ctx.gateway.current_session("dev-1");

    let response = ctx
        .server
        .post("/api/devices/dev-1/sensor-data")
        .json(&fixtures::flat_sample(T0))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["code"], "SEQ_001");
    assert_eq!(ctx.gateway.current_session("dev-1"), before);
}

/// Test legacy endpoint without device_id returns VALID_001
#[tokio::test]
async fn test_legacy_without_device_id_returns_400() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/api/iot/sensor-data")
        .json(&fixtures::flat_sample(T0))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALID_001");
}

/// Test read endpoints require a bearer token
#[tokio::test]
async fn test_read_endpoints_require_auth() {
    let ctx = TestContext::new().await;

    let response = ctx.server.get("/api/devices/dev-1/session").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["code"], "AUTH_001");

    let response = ctx
        .server
        .get("/api/devices/dev-1/stream")
        .add_header("Authorization", "Basic abc")
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["code"], "AUTH_002");

    let response = ctx
        .server
        .get("/api/auth/user")
        .add_header("Authorization", "Bearer unknown")
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["code"], "AUTH_003");
}
