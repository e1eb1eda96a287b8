//! Emergency detection and resolution through the HTTP surface.

use axum::http::StatusCode;
use integration_tests::{fixtures, setup::TestContext};
use serde_json::{json, Value};
use store::paths;

const T0: i64 = 1_700_000_000_000;

async fn active(ctx: &TestContext) -> Vec<Value> {
    ctx.server
        .get("/api/emergency/active")
        .add_header("Authorization", fixtures::bearer())
        .await
        .json()
}

#[tokio::test]
async fn test_sos_sample_raises_emergency() {
    let ctx = TestContext::new().await;

    let body: Value = ctx
        .server
        .post("/api/devices/dev-1/sensor-data")
        .json(&fixtures::sos_sample(T0))
        .await
        .json();

    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["trigger_kind"], "sos");
    assert_eq!(events[0]["session_id"], body["session_id"]);

    ctx.flush().await;

    let active = active(&ctx).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["trigger"], "sos");
    assert_eq!(active[0]["device_id"], "dev-1");
    assert_eq!(active[0]["id"], events[0]["id"]);
}

#[tokio::test]
async fn test_stale_sos_still_raises_emergency() {
    let ctx = TestContext::new().await;

    ctx.server
        .post("/api/devices/dev-1/sensor-data")
        .json(&fixtures::flat_sample(T0 + 5_000))
        .await
        .assert_status_ok();

    let response = ctx
        .server
        .post("/api/devices/dev-1/sensor-data")
        .json(&fixtures::sos_sample(T0))
        .await;
    response.assert_status(StatusCode::CONFLICT);

    // Rejected, but the SOS comes back in the same response.
    let body: Value = response.json();
    assert_eq!(body["accepted"], false);
    assert_eq!(body["code"], "SEQ_001");
    assert!(body["score"].is_null());
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["trigger_kind"], "sos");
    assert_eq!(events[0]["timestamp"], T0);

    ctx.flush().await;
    let active = active(&ctx).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["id"], events[0]["id"]);
}

#[tokio::test]
async fn test_stale_sample_without_sos_is_plain_conflict() {
    let ctx = TestContext::new().await;

    ctx.server
        .post("/api/devices/dev-1/sensor-data")
        .json(&fixtures::flat_sample(T0 + 5_000))
        .await
        .assert_status_ok();

    let response = ctx
        .server
        .post("/api/devices/dev-1/sensor-data")
        .json(&fixtures::flat_sample(T0))
        .await;
    response.assert_status(StatusCode::CONFLICT);

    let body: Value = response.json();
    assert_eq!(body["code"], "SEQ_001");
    assert!(body.get("events").is_none());
}

#[tokio::test]
async fn test_active_list_keeps_newest() {
    let ctx = TestContext::new().await;

    // Key order runs opposite to event time.
    for i in 0..120 {
        let id = format!("evt-{:03}", i);
        ctx.store
            .set(
                &paths::emergency(&id),
                json!({
                    "id": id,
                    "device_id": "dev-1",
                    "trigger": "sos",
                    "timestamp": T0 - i * 1_000,
                    "status": "active",
                }),
            )
            .await
            .unwrap();
    }
    ctx.store
        .set(
            &paths::emergency("evt-resolved"),
            json!({ "id": "evt-resolved", "timestamp": T0 + 1, "status": "resolved" }),
        )
        .await
        .unwrap();

    let active = active(&ctx).await;
    assert_eq!(active.len(), 100);
    assert_eq!(active[0]["id"], "evt-099");
    assert_eq!(active[99]["id"], "evt-000");
    assert!(active.iter().all(|e| e["status"] == "active"));
}

#[tokio::test]
async fn test_manual_signal() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/api/emergency/signal")
        .add_header("Authorization", fixtures::bearer())
        .json(&json!({ "device_id": "dev-1", "location": "Main hall, level 2" }))
        .await;
    response.assert_status_ok();

    let record: Value = response.json();
    assert_eq!(record["trigger"], "manual");
    assert_eq!(record["device_id"], "dev-1");
    assert_eq!(record["location"], "Main hall, level 2");
    assert_eq!(record["status"], "active");
    assert_eq!(record["raised_by"], fixtures::TEST_UID);
    assert!(record["session_id"].is_null());

    let id = record["id"].as_str().unwrap();
    let stored = ctx.stored(&paths::emergency(id)).await.unwrap();
    assert_eq!(stored["location"], "Main hall, level 2");
    assert_eq!(stored["raised_by"], fixtures::TEST_UID);

    let active = active(&ctx).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["id"], id);
}

#[tokio::test]
async fn test_manual_signal_ties_to_open_session() {
    let ctx = TestContext::new().await;

    let sample: Value = ctx
        .server
        .post("/api/devices/dev-1/sensor-data")
        .json(&fixtures::flat_sample(T0))
        .await
        .json();

    let record: Value = ctx
        .server
        .post("/api/emergency/signal")
        .add_header("Authorization", fixtures::bearer())
        .json(&json!({ "device_id": "dev-1", "location": "ICU", "status": "dispatched" }))
        .await
        .json();

    assert_eq!(record["session_id"], sample["session_id"]);
    assert_eq!(record["status"], "dispatched");
}

#[tokio::test]
async fn test_manual_signal_rejections() {
    let ctx = TestContext::new().await;

    ctx.server
        .post("/api/emergency/signal")
        .json(&json!({ "device_id": "dev-1" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    for body in [json!({ "location": "nowhere" }), json!({ "device_id": "bad id!" })] {
        ctx.server
            .post("/api/emergency/signal")
            .add_header("Authorization", fixtures::bearer())
            .json(&body)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    assert!(ctx.stored(paths::node::EMERGENCIES).await.is_none());
}

#[tokio::test]
async fn test_resolve_emergency() {
    let ctx = TestContext::new().await;

    ctx.server
        .post("/api/devices/dev-1/sensor-data")
        .json(&fixtures::sos_sample(T0))
        .await
        .assert_status_ok();
    ctx.flush().await;

    let event_id = active(&ctx).await[0]["id"].as_str().unwrap().to_string();

    let response = ctx
        .server
        .put(&format!("/api/emergency/{}", event_id))
        .add_header("Authorization", fixtures::bearer())
        .json(&json!({ "status": "resolved", "device_id": "someone-else" }))
        .await;
    response.assert_status_ok();

    let updated: Value = response.json();
    assert_eq!(updated["status"], "resolved");
    assert_eq!(updated["updated_by"], fixtures::TEST_UID);
    assert_eq!(updated["device_id"], "dev-1");
    assert_eq!(updated["trigger"], "sos");

    assert!(active(&ctx).await.is_empty());
}

#[tokio::test]
async fn test_update_unknown_emergency_returns_404() {
    let ctx = TestContext::new().await;

    for id in ["nope", "2f7b1c8e-4a3d-4d3e-9a55-0c1d2e3f4a5b"] {
        ctx.server
            .put(&format!("/api/emergency/{}", id))
            .add_header("Authorization", fixtures::bearer())
            .json(&json!({ "status": "resolved" }))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
