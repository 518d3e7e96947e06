mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use common::{TestHarness, harness, seed_basic};
use stream_curator::web::{AppState, create_router};

struct ApiFixture {
    server: TestServer,
    harness: TestHarness,
    token: CancellationToken,
}

impl Drop for ApiFixture {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn api() -> ApiFixture {
    let harness = harness().await;
    seed_basic(&harness.platform).await;
    harness.platform.add_profile(7, "Living Room", &[(1, true), (2, true)]).await;

    let token = CancellationToken::new();
    harness.engine.spawn_controller(token.clone()).await;

    let state = AppState::new(harness.database.clone(), harness.engine.service());
    let server = TestServer::new(create_router(state)).unwrap();
    ApiFixture { server, harness, token }
}

fn data(body: &Value) -> &Value {
    assert_eq!(body["success"], json!(true), "unexpected envelope: {body}");
    &body["data"]
}

#[tokio::test]
async fn health_reports_database_connectivity() {
    let f = api().await;
    let response = f.server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(data(&body)["status"], "healthy");
    assert_eq!(data(&body)["database"], "connected");
}

#[tokio::test]
async fn pipeline_settings_accept_modes_or_toggles_but_not_both() {
    let f = api().await;

    let body: Value = f.server.get("/api/automation/pipeline").await.json();
    assert_eq!(data(&body)["mode"], "pipeline_1_5");

    let response = f
        .server
        .put("/api/automation/pipeline")
        .json(&json!({ "mode": "pipeline_2" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(data(&body)["toggles"]["auto_quality_checking"], json!(false));

    let response = f
        .server
        .put("/api/automation/pipeline")
        .json(&json!({
            "mode": "pipeline_1",
            "toggles": { "auto_m3u_updates": true }
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["success"], json!(false));

    let body: Value = f.server.get("/api/automation/pipeline").await.json();
    assert_eq!(data(&body)["mode"], "pipeline_2");
}

#[tokio::test]
async fn limits_and_schedule_are_validated() {
    let f = api().await;

    let response = f
        .server
        .put("/api/automation/queue/limits")
        .json(&json!({ "max_size": 0, "max_channels_per_run": 10 }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = f
        .server
        .put("/api/automation/concurrency")
        .json(&json!({ "global_limit": 2, "stagger_delay": "250ms" }))
        .await;
    response.assert_status_ok();

    let response = f
        .server
        .put("/api/automation/schedule")
        .json(&json!({ "expression": "every night" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = f
        .server
        .put("/api/automation/schedule")
        .json(&json!({ "expression": "30 4 * * 1" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(data(&body)["expression"], "30 4 * * 1");
    assert_eq!(data(&body)["timezone"], "UTC");
    assert!(data(&body)["next_run"].is_string());
}

#[tokio::test]
async fn channel_checks_go_through_the_queue() {
    let f = api().await;

    let response = f.server.post("/api/automation/channels/999/check").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = f
        .server
        .post("/api/automation/channels/1/check")
        .add_query_param("bypass_immunity", true)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(data(&body)["enqueued"], json!([1]));
    assert_eq!(data(&body)["bypass_immunity"], json!(true));

    let body: Value = f.server.get("/api/automation/queue").await.json();
    assert_eq!(data(&body)[0]["channel_id"], json!(1));
    assert_eq!(data(&body)[0]["source"], "manual_check");

    let body: Value = f.server.delete("/api/automation/queue").await.json();
    assert_eq!(data(&body)["removed"], json!(1));
}

#[tokio::test]
async fn full_queue_answers_too_many_requests() {
    let f = api().await;
    f.server
        .put("/api/automation/queue/limits")
        .json(&json!({ "max_size": 1, "max_channels_per_run": 5 }))
        .await
        .assert_status_ok();

    let response = f
        .server
        .post("/api/automation/queue")
        .json(&json!({ "channel_ids": [1, 2] }))
        .await;
    assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(f.harness.engine.queue().len().await, 1);
}

#[tokio::test]
async fn status_summarizes_the_engine() {
    let f = api().await;
    f.server
        .post("/api/automation/queue")
        .json(&json!({ "channel_ids": [2, 3] }))
        .await
        .assert_status_ok();

    let body: Value = f.server.get("/api/automation/status").await.json();
    let status = data(&body);
    assert_eq!(status["queue"]["queued"], json!(2));
    assert_eq!(status["pipeline"]["mode"], "pipeline_1_5");
    assert_eq!(status["global_schedule"], "0 3 * * *");
    assert_eq!(status["pending_events"], json!(0));
    assert_eq!(status["workers"]["running"], json!(false));
}

#[tokio::test]
async fn overrides_resolve_through_groups() {
    let f = api().await;

    f.server
        .put("/api/automation/groups/100/settings")
        .json(&json!({ "checking_mode": "disabled" }))
        .await
        .assert_status_ok();

    let body: Value = f.server.get("/api/automation/channels/2/settings").await.json();
    let view = data(&body);
    assert_eq!(view["effective"]["checking"]["mode"], "disabled");
    assert_eq!(view["effective"]["checking"]["source"], "group");
    assert_eq!(view["effective"]["matching"]["source"], "default");

    let body: Value = f
        .server
        .put("/api/automation/channels/2/settings")
        .json(&json!({ "checking_mode": "enabled" }))
        .await
        .json();
    assert_eq!(data(&body)["effective"]["checking"]["source"], "channel");
    assert_eq!(data(&body)["override"]["checking_mode"], "enabled");

    let response = f.server.get("/api/automation/channels/999/settings").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rule_endpoints_round_out_crud() {
    let f = api().await;

    let response = f
        .server
        .post("/api/automation/rules")
        .json(&json!({
            "name": "Broken",
            "channel_ids": [1],
            "regex_pattern": "([",
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = f
        .server
        .post("/api/automation/rules")
        .json(&json!({
            "name": "Football",
            "channel_ids": [1, 2],
            "regex_pattern": "champions league",
            "minutes_before": 10,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: Value = response.json();
    let id = data(&body)["id"].as_str().unwrap().to_string();
    assert_eq!(data(&body)["enabled"], json!(true));

    f.server
        .get(&format!("/api/automation/rules/{id}"))
        .await
        .assert_status_ok();
    let body: Value = f.server.get("/api/automation/rules").await.json();
    assert_eq!(data(&body).as_array().unwrap().len(), 1);

    let response = f.server.delete(&format!("/api/automation/rules/{id}")).await;
    assert!(response.status_code().is_success());

    let response = f.server.get(&format!("/api/automation/rules/{id}")).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = f
        .server
        .post("/api/automation/rules/test")
        .json(&json!({ "regex_pattern": "news", "channel_ids": [] }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn manual_events_can_be_created_and_deleted() {
    let f = api().await;
    let start = chrono::Utc::now() + chrono::Duration::hours(2);

    let response = f
        .server
        .post("/api/automation/events")
        .json(&json!({
            "channel_id": 3,
            "program_title": "Election Night",
            "program_start": start,
            "program_end": start + chrono::Duration::hours(4),
            "minutes_before": 30,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: Value = response.json();
    let id = data(&body)["id"].as_str().unwrap().to_string();
    assert_eq!(data(&body)["rule_id"], Value::Null);

    let body: Value = f.server.get("/api/automation/events").await.json();
    assert_eq!(data(&body).as_array().unwrap().len(), 1);

    let response = f.server.delete(&format!("/api/automation/events/{id}")).await;
    assert!(response.status_code().is_success());
    let response = f.server.delete(&format!("/api/automation/events/{id}")).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dead_stream_endpoints() {
    let f = api().await;

    let response = f
        .server
        .put("/api/dead-streams/config")
        .json(&json!({ "enabled": true }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = f.server.post("/api/dead-streams/disable-empty").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    f.server
        .put("/api/dead-streams/config")
        .json(&json!({ "enabled": true, "target_profile_id": 7 }))
        .await
        .assert_status_ok();

    let body: Value = f.server.post("/api/dead-streams/disable-empty").await.json();
    assert_eq!(data(&body)["evaluated"], json!(2));
    assert_eq!(data(&body)["disabled"], json!([]));

    let body: Value = f.server.get("/api/dead-streams/records").await.json();
    assert_eq!(data(&body), &json!([]));
}

#[tokio::test]
async fn profile_snapshots() {
    let f = api().await;

    let body: Value = f.server.get("/api/profiles").await.json();
    assert_eq!(data(&body)[0]["name"], "Living Room");

    let response = f.server.get("/api/profiles/7/snapshot").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = f.server.post("/api/profiles/7/snapshot").await;
    assert_eq!(response.status_code(), StatusCode::CREATED);

    let body: Value = f.server.get("/api/profiles/7/snapshot").await.json();
    assert_eq!(data(&body)["channel_states"].as_array().unwrap().len(), 2);

    let body: Value = f.server.get("/api/profiles/snapshots").await.json();
    assert_eq!(data(&body).as_array().unwrap().len(), 1);

    let response = f.server.delete("/api/profiles/7/snapshot").await;
    assert!(response.status_code().is_success());
    let response = f.server.post("/api/profiles/99/snapshot").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn changelog_lists_recent_runs() {
    let f = api().await;
    f.server
        .post("/api/automation/global-action")
        .await
        .assert_status_ok();

    let body: Value = f
        .server
        .get("/api/automation/changelog")
        .add_query_param("limit", 5)
        .await
        .json();
    let entries = data(&body).as_array().unwrap();
    assert!(!entries.is_empty());
    assert_eq!(entries[0]["action"], "pipeline_run");
}
