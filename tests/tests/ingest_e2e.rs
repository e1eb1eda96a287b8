//! End-to-end tests for sample ingestion.
//!
//! Samples go through the real router, device workers and persistence
//! worker; assertions read back what reached the in-memory store.

use axum::http::StatusCode;
use integration_tests::{
    fixtures,
    mocks::DownStore,
    setup::{test_config, TestContext},
};
use serde_json::Value;
use std::sync::Arc;

const T0: i64 = 1_700_000_000_000;

#[tokio::test]
async fn test_device_sample_is_scored_and_persisted() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/api/devices/dev-1/sensor-data")
        .json(&fixtures::flat_sample(T0))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["accepted"], true);
    assert_eq!(body["score"]["overall"], 1.0);
    assert_eq!(body["score"]["sample_ref"], T0);
    assert_eq!(body["session_status"], "active");
    assert!(body["events"].as_array().unwrap().is_empty());

    ctx.flush().await;

    let samples = ctx.stored_children("sensor_data").await;
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0]["device_id"], "dev-1");
    assert_eq!(samples[0]["quality_score"], 1.0);
    // Unreported optionals are not stored as nulls
    assert!(samples[0].get("humidity").is_none());

    let cpr = ctx.stored("devices/dev-1/cpr").await.expect("cpr section");
    assert_eq!(cpr["compression_rate"], 110.0);
    assert_eq!(cpr["timestamp"], T0);
}

#[tokio::test]
async fn test_sectioned_payload_scores_like_flat() {
    let ctx = TestContext::new().await;

    let flat: Value = ctx
        .server
        .post("/api/devices/dev-flat/sensor-data")
        .json(&fixtures::flat_sample(T0))
        .await
        .json();
    let sectioned: Value = ctx
        .server
        .post("/api/devices/dev-sectioned/sensor-data")
        .json(&fixtures::sectioned_sample(T0))
        .await
        .json();

    assert_eq!(flat["score"], sectioned["score"]);
}

#[tokio::test]
async fn test_samples_accumulate_into_one_session() {
    let ctx = TestContext::new().await;

    let mut session_ids = Vec::new();
    for i in 0..3 {
        let body: Value = ctx
            .server
            .post("/api/devices/dev-1/sensor-data")
            .json(&fixtures::flat_sample(T0 + i * 1_000))
            .await
            .json();
        session_ids.push(body["session_id"].as_str().unwrap().to_string());
    }

    assert!(session_ids.windows(2).all(|w| w[0] == w[1]));

    let session: Value = ctx
        .server
        .get("/api/devices/dev-1/session")
        .add_header("Authorization", fixtures::bearer())
        .await
        .json();
    assert_eq!(session["session_id"], session_ids[0].as_str());
    assert_eq!(session["sample_count"], 3);
    assert_eq!(session["compression_count"], 3);
    assert_eq!(session["start_time"], T0);
    assert_eq!(session["last_sample_time"], T0 + 2_000);
}

#[tokio::test]
async fn test_legacy_endpoint_reads_device_from_body() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/api/iot/sensor-data")
        .json(&fixtures::legacy_sample("dev-legacy", T0))
        .await;

    response.assert_status_ok();
    assert!(ctx.gateway.current_session("dev-legacy").is_some());
}

#[tokio::test]
async fn test_devices_are_independent() {
    let ctx = TestContext::new().await;

    ctx.server
        .post("/api/devices/dev-a/sensor-data")
        .json(&fixtures::flat_sample(T0 + 10_000))
        .await
        .assert_status_ok();

    // Older than dev-a's last sample, but dev-b has its own watermark.
    ctx.server
        .post("/api/devices/dev-b/sensor-data")
        .json(&fixtures::flat_sample(T0))
        .await
        .assert_status_ok();

    assert_eq!(ctx.gateway.device_count(), 2);
    assert_eq!(ctx.gateway.open_session_count(), 2);
}

#[tokio::test]
async fn test_store_outage_does_not_block_ingestion() {
    let store = Arc::new(DownStore::new());
    let ctx = TestContext::with_store(store.clone(), test_config()).await;

    for i in 0..3 {
        ctx.server
            .post("/api/devices/dev-1/sensor-data")
            .json(&fixtures::flat_sample(T0 + i * 1_000))
            .await
            .assert_status(StatusCode::OK);
    }

    ctx.flush().await;

    let session = ctx.gateway.current_session("dev-1").expect("session survives");
    assert_eq!(session.sample_count, 3);
    assert!(store.attempts() >= 3);
}
