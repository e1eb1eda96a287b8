//! Latest per-device readings written by the persistence worker.

use axum::http::StatusCode;
use integration_tests::{fixtures, setup::TestContext};
use serde_json::{json, Value};

const T0: i64 = 1_700_000_000_000;

async fn read(ctx: &TestContext, path: &str) -> Value {
    let response = ctx
        .server
        .get(path)
        .add_header("Authorization", fixtures::bearer())
        .await;
    response.assert_status_ok();
    response.json()
}

async fn ingest(ctx: &TestContext, device_id: &str, sample: &Value) {
    ctx.server
        .post(&format!("/api/devices/{}/sensor-data", device_id))
        .json(sample)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_sections_follow_latest_sample() {
    let ctx = TestContext::new().await;
    ingest(&ctx, "esp32-01", &fixtures::sectioned_sample(T0)).await;
    ingest(&ctx, "esp32-01", &fixtures::flat_sample(T0 + 1_000)).await;
    ctx.flush().await;

    let cpr = read(&ctx, "/api/devices/esp32-01/cpr").await;
    assert_eq!(cpr["compression_rate"], 110.0);
    assert_eq!(cpr["pressure"], 2.0);
    assert_eq!(cpr["timestamp"], T0 + 1_000);
    assert_eq!(cpr["quality_score"], 1.0);

    // Barometric pressure is not a CPR reading and is not kept.
    let environment = read(&ctx, "/api/devices/esp32-01/environment").await;
    assert_eq!(environment["temperature"], 36.5);
    assert!(environment.get("pressure").is_none());

    let gesture = read(&ctx, "/api/devices/esp32-01/gesture").await;
    assert_eq!(gesture["proximity"], 0.4);

    let status = read(&ctx, "/api/devices/esp32-01/status").await;
    assert_eq!(status["sos_triggered"], false);
    assert_eq!(status["battery_level"], 87);
    assert_eq!(status["last_update"], T0 + 1_000);

    let all = read(&ctx, "/api/devices/esp32-01/sensor-data").await;
    assert_eq!(all["cpr"], cpr);
    assert_eq!(all["status"], status);
}

#[tokio::test]
async fn test_all_devices() {
    let ctx = TestContext::new().await;
    assert_eq!(read(&ctx, "/api/devices/all/sensor-data").await, json!({}));

    ingest(&ctx, "dev-a", &fixtures::flat_sample(T0)).await;
    ingest(&ctx, "dev-b", &fixtures::sos_sample(T0)).await;
    ctx.flush().await;

    let all = read(&ctx, "/api/devices/all/sensor-data").await;
    let devices = all.as_object().unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(all["dev-a"]["status"]["sos_triggered"], false);
    assert_eq!(all["dev-b"]["status"]["sos_triggered"], true);
}

#[tokio::test]
async fn test_unknown_device_reads_empty() {
    let ctx = TestContext::new().await;

    for path in [
        "/api/devices/ghost/sensor-data",
        "/api/devices/ghost/cpr",
        "/api/devices/ghost/environment",
        "/api/devices/ghost/gesture",
        "/api/devices/ghost/status",
    ] {
        assert_eq!(read(&ctx, path).await, json!({}));
    }
}

#[tokio::test]
async fn test_readings_require_auth() {
    let ctx = TestContext::new().await;

    ctx.server
        .get("/api/devices/dev-1/cpr")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    ctx.server
        .get("/api/devices/all/sensor-data")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}
