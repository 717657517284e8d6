//! Interest schedule integration tests.

mod common;

use std::future::IntoFuture;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::{json, Value};

#[tokio::test]
async fn child_route_sets_schedule_and_rate_together() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .put(&harness.child_path("/interest-schedule"))
        .add_header("authorization", harness.parent_auth_header())
        .json(&json!({ "frequency": "monthly", "day_of_month": 1, "interest_rate_bps": 500 }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["frequency"], "monthly");
    assert_eq!(body["day_of_month"], 1);
    assert_eq!(body["interest_rate_bps"], 500);
    assert_eq!(body["status"], "active");

    let response = harness
        .server
        .get(&harness.child_path("/balance"))
        .add_header("authorization", harness.child_auth_header())
        .await;
    assert_eq!(response.json::<Value>()["interest_rate_bps"], 500);

    // Second PUT updates in place; rate untouched when omitted.
    let response = harness
        .server
        .put(&harness.child_path("/interest-schedule"))
        .add_header("authorization", harness.parent_auth_header())
        .json(&json!({ "frequency": "weekly", "day_of_week": 0 }))
        .await;
    response.assert_status_ok();
    let updated: Value = response.json();
    assert_eq!(updated["id"], body["id"]);
    assert_eq!(updated["frequency"], "weekly");
    assert_eq!(updated["interest_rate_bps"], 500);
}

#[tokio::test]
async fn concurrent_child_route_puts_all_succeed() {
    let harness = TestHarness::new().await;
    let path = harness.child_path("/interest-schedule");

    let requests = (0..8).map(|_| {
        harness
            .server
            .put(&path)
            .add_header("authorization", harness.parent_auth_header())
            .json(&json!({ "frequency": "monthly", "day_of_month": 1 }))
            .into_future()
    });
    let responses = futures::future::join_all(requests).await;

    let statuses: Vec<StatusCode> = responses.iter().map(|r| r.status_code()).collect();
    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::CREATED).count(),
        1,
        "{statuses:?}"
    );
    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::OK).count(),
        7,
        "{statuses:?}"
    );

    let response = harness
        .server
        .get("/api/interest-schedules")
        .add_header("authorization", harness.parent_auth_header())
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["schedules"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_rate_changes_nothing() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .put(&harness.child_path("/interest-schedule"))
        .add_header("authorization", harness.parent_auth_header())
        .json(&json!({ "frequency": "monthly", "day_of_month": 1, "interest_rate_bps": -1 }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"]["code"], "invalid_rate");

    harness
        .server
        .get(&harness.child_path("/interest-schedule"))
        .add_header("authorization", harness.parent_auth_header())
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn resource_routes_round_trip() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/api/interest-schedules")
        .add_header("authorization", harness.parent_auth_header())
        .json(&json!({
            "child_id": harness.child.id.to_string(),
            "frequency": "biweekly",
            "day_of_week": 3
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let created: Value = response.json();
    let path = format!("/api/interest-schedules/{}", created["id"].as_str().unwrap());

    let response = harness
        .server
        .get("/api/interest-schedules")
        .add_header("authorization", harness.parent_auth_header())
        .await;
    response.assert_status_ok();
    let listed: Value = response.json();
    assert_eq!(listed["schedules"][0]["child_name"], "Byron");

    let response = harness
        .server
        .put(&path)
        .add_header("authorization", harness.parent_auth_header())
        .json(&json!({ "frequency": "monthly", "day_of_month": 15, "interest_rate_bps": 120 }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["day_of_month"], 15);
    assert_eq!(body["interest_rate_bps"], 120);

    let response = harness
        .server
        .post(&format!("{path}/pause"))
        .add_header("authorization", harness.parent_auth_header())
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "paused");

    harness
        .server
        .post(&format!("{path}/pause"))
        .add_header("authorization", harness.parent_auth_header())
        .await
        .assert_status(StatusCode::CONFLICT);

    harness
        .server
        .post(&format!("{path}/resume"))
        .add_header("authorization", harness.parent_auth_header())
        .await
        .assert_status_ok();

    harness
        .server
        .delete(&path)
        .add_header("authorization", harness.parent_auth_header())
        .await
        .assert_status(StatusCode::NO_CONTENT);
    harness
        .server
        .get(&path)
        .add_header("authorization", harness.parent_auth_header())
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn one_interest_schedule_per_child() {
    let harness = TestHarness::new().await;
    let body = json!({
        "child_id": harness.child.id.to_string(),
        "frequency": "weekly",
        "day_of_week": 5
    });

    harness
        .server
        .post("/api/interest-schedules")
        .add_header("authorization", harness.parent_auth_header())
        .json(&body)
        .await
        .assert_status(StatusCode::CREATED);

    let response = harness
        .server
        .post("/api/interest-schedules")
        .add_header("authorization", harness.parent_auth_header())
        .json(&body)
        .await;
    response.assert_status(StatusCode::CONFLICT);

    // An allowance for the same child is a different kind and is fine.
    harness
        .server
        .put(&harness.child_path("/allowance"))
        .add_header("authorization", harness.parent_auth_header())
        .json(&json!({ "amount_cents": 100, "frequency": "weekly", "day_of_week": 5 }))
        .await
        .assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn child_route_pause_resume_and_child_read() {
    let harness = TestHarness::new().await;
    harness
        .server
        .put(&harness.child_path("/interest-schedule"))
        .add_header("authorization", harness.parent_auth_header())
        .json(&json!({ "frequency": "weekly", "day_of_week": 1 }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = harness
        .server
        .post(&harness.child_path("/interest-schedule/pause"))
        .add_header("authorization", harness.parent_auth_header())
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "paused");

    let response = harness
        .server
        .get(&harness.child_path("/interest-schedule"))
        .add_header("authorization", harness.child_auth_header())
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "paused");

    harness
        .server
        .post(&harness.child_path("/interest-schedule/resume"))
        .add_header("authorization", harness.child_auth_header())
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let response = harness
        .server
        .post(&harness.child_path("/interest-schedule/resume"))
        .add_header("authorization", harness.parent_auth_header())
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "active");

    harness
        .server
        .delete(&harness.child_path("/interest-schedule"))
        .add_header("authorization", harness.parent_auth_header())
        .await
        .assert_status(StatusCode::NO_CONTENT);
}
