//! Child account integration tests.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::{json, Value};

#[tokio::test]
async fn parent_creates_and_lists_children() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/api/children")
        .add_header("authorization", harness.parent_auth_header())
        .json(&json!({ "name": "  Annabella ", "interest_rate_bps": 250 }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let created: Value = response.json();
    assert_eq!(created["name"], "Annabella");
    assert_eq!(created["balance_cents"], 0);
    assert_eq!(created["interest_rate_bps"], 250);
    assert_eq!(created["family_id"], harness.family.id.to_string());

    let response = harness
        .server
        .get("/api/children")
        .add_header("authorization", harness.parent_auth_header())
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let names: Vec<_> = body["children"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["Annabella", "Byron"]);
}

#[tokio::test]
async fn child_sees_only_itself() {
    let harness = TestHarness::new().await;
    harness.sibling("Annabella").await;

    let response = harness
        .server
        .get("/api/children")
        .add_header("authorization", harness.child_auth_header())
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let children = body["children"].as_array().unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0]["id"], harness.child.id.to_string());
}

#[tokio::test]
async fn duplicate_name_conflicts() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/api/children")
        .add_header("authorization", harness.parent_auth_header())
        .json(&json!({ "name": "Byron" }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["error"]["code"], "conflict");
}

#[tokio::test]
async fn create_validates_name_and_rate() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/api/children")
        .add_header("authorization", harness.parent_auth_header())
        .json(&json!({ "name": "   " }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"]["code"], "invalid_request");

    let response = harness
        .server
        .post("/api/children")
        .add_header("authorization", harness.parent_auth_header())
        .json(&json!({ "name": "Ok", "interest_rate_bps": 10_001 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"]["code"], "invalid_rate");
}

#[tokio::test]
async fn update_changes_only_given_fields() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .put(&harness.child_path(""))
        .add_header("authorization", harness.parent_auth_header())
        .json(&json!({ "interest_rate_bps": 500 }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["name"], "Byron");
    assert_eq!(body["interest_rate_bps"], 500);

    let response = harness
        .server
        .put(&harness.child_path(""))
        .add_header("authorization", harness.parent_auth_header())
        .json(&json!({ "name": "Lord Byron" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["name"], "Lord Byron");
    assert_eq!(body["interest_rate_bps"], 500);
}

#[tokio::test]
async fn delete_removes_child_and_its_ledger() {
    let harness = TestHarness::new().await;
    harness
        .server
        .post(&harness.child_path("/deposit"))
        .add_header("authorization", harness.parent_auth_header())
        .json(&json!({ "amount_cents": 100 }))
        .await
        .assert_status_ok();

    harness
        .server
        .delete(&harness.child_path(""))
        .add_header("authorization", harness.parent_auth_header())
        .await
        .assert_status(StatusCode::NO_CONTENT);

    harness
        .server
        .get(&harness.child_path(""))
        .add_header("authorization", harness.parent_auth_header())
        .await
        .assert_status(StatusCode::NOT_FOUND);
    harness
        .server
        .get(&harness.child_path("/transactions"))
        .add_header("authorization", harness.parent_auth_header())
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
