//! Integration tests for tankwatch-wh API endpoints
//!
//! Tests cover:
//! - Health endpoint (no role required)
//! - Role gating on /api routes
//! - Tank view and branch rollup
//! - Bulk validate / commit, including partial failure and refreshed view
//! - CSV export and import

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tankwatch_common::db::{BranchRecord, OilType};
use tankwatch_wh::service::InventoryService;
use tankwatch_wh::store::InMemoryStore;
use tankwatch_wh::{build_router, AppState};
use tower::util::ServiceExt; // for `oneshot` method

/// Test helper: two branches, three tanks
fn seeded_store() -> InMemoryStore {
    InMemoryStore::with_data(
        vec![
            BranchRecord {
                id: "north".into(),
                name: "North Depot".into(),
                oil_tanks: Some(json!([
                    {"oilTypeId": "diesel", "currentLevel": 100, "capacity": 500},
                    {"oilTypeId": "hyd", "currentLevel": 10, "capacity": 200}
                ])),
            },
            BranchRecord {
                id: "south".into(),
                name: "South Yard".into(),
                oil_tanks: Some(json!({
                    "main": {"oil_type_id": "diesel", "current_level": 950, "capacity": 1000}
                })),
            },
        ],
        vec![
            OilType { id: "diesel".into(), name: "Diesel".into() },
            OilType { id: "hyd".into(), name: "Hydraulic".into() },
        ],
    )
}

/// Test helper: Create app over `store`
fn setup_app(store: &InMemoryStore, role_gating: bool) -> axum::Router {
    let service = Arc::new(InventoryService::new(Arc::new(store.clone()), 500));
    build_router(AppState::new(service, role_gating))
}

/// Test helper: Create request as a warehouse user
fn test_request(method: &str, uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-tankwatch-role", "warehouse")
        .header("x-tankwatch-actor", "kim")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap()
}

fn json_body(value: Value) -> Body {
    Body::from(value.to_string())
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

async fn extract_text(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    String::from_utf8(bytes.to_vec()).expect("Should be UTF-8")
}

// =============================================================================
// Health Endpoint Tests
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_role_required() {
    let app = setup_app(&seeded_store(), true);

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "tankwatch-wh");
    assert_eq!(body["store"], "memory");
    assert!(body["version"].is_string());
}

// =============================================================================
// Role Gating Tests
// =============================================================================

#[tokio::test]
async fn test_missing_role_is_unauthorized() {
    let app = setup_app(&seeded_store(), true);

    let request = Request::builder().uri("/api/tanks").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = extract_json(response.into_body()).await;
    assert!(body["error"].as_str().unwrap().contains("x-tankwatch-role"));
}

#[tokio::test]
async fn test_driver_is_forbidden() {
    let app = setup_app(&seeded_store(), true);

    let request = Request::builder()
        .uri("/api/tanks")
        .header("x-tankwatch-role", "driver")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_gating_disabled_allows_anonymous() {
    let app = setup_app(&seeded_store(), false);

    let request = Request::builder().uri("/api/tanks").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Read View Tests
// =============================================================================

#[tokio::test]
async fn test_tank_view() {
    let app = setup_app(&seeded_store(), true);

    let response = app
        .oneshot(test_request("GET", "/api/tanks", Body::empty()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    let tanks = body.as_array().unwrap();
    assert_eq!(tanks.len(), 3);

    assert_eq!(tanks[0]["id"], "north:0");
    assert_eq!(tanks[0]["oil_type_name"], "Diesel");
    assert_eq!(tanks[0]["fill_percentage"], 20.0);
    assert_eq!(tanks[0]["status"], "low");
    assert_eq!(tanks[1]["status"], "critical");
    assert_eq!(tanks[2]["id"], "south:main");
    assert_eq!(tanks[2]["status"], "full");
}

#[tokio::test]
async fn test_rollup_lists_every_branch() {
    let app = setup_app(&seeded_store(), true);

    let response = app
        .oneshot(test_request("GET", "/api/rollup", Body::empty()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    let rollups = body.as_array().unwrap();
    assert_eq!(rollups.len(), 2);
    assert_eq!(rollups[0]["branch_name"], "North Depot");
    assert_eq!(rollups[0]["status"], "needs-attention");
    assert_eq!(rollups[0]["counts"]["never"], 2);
}

// =============================================================================
// Bulk Update Tests
// =============================================================================

#[tokio::test]
async fn test_validate_reports_violations() {
    let app = setup_app(&seeded_store(), true);

    let body = json_body(json!({"changes": {"north:0": 600, "north:1": 50}}));
    let response = app
        .oneshot(test_request("POST", "/api/bulk/validate", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["valid"], false);
    assert_eq!(body["violations"].as_array().unwrap().len(), 1);
    assert_eq!(body["violations"][0]["tank_id"], "north:0");
    assert_eq!(body["violations"][0]["kind"], "exceeds_capacity");
    assert_eq!(body["violations"][0]["capacity"], 500.0);
}

#[tokio::test]
async fn test_commit_with_violation_writes_nothing() {
    let store = seeded_store();
    let app = setup_app(&store, true);

    let body = json_body(json!({"changes": {"north:0": 600, "south:main": 10}}));
    let response = app
        .oneshot(test_request("POST", "/api/bulk/commit", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["violations"].as_array().unwrap().len(), 1);
    assert_eq!(store.log_count().await, 0);
}

#[tokio::test]
async fn test_commit_returns_report_and_refreshed_tanks() {
    let store = seeded_store();
    let app = setup_app(&store, true);

    let body = json_body(json!({
        "changes": {"north:1": 150, "south:main": 400},
        "notes": "morning dip"
    }));
    let response = app
        .oneshot(test_request("POST", "/api/bulk/commit", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["report"]["outcome"], "succeeded");

    let branches = body["report"]["branches"].as_array().unwrap();
    assert_eq!(branches.len(), 2);
    assert_eq!(branches[0]["applied"][0]["actor"], "kim");
    assert_eq!(branches[0]["applied"][0]["notes"], "morning dip");
    assert_eq!(branches[0]["applied"][0]["old_level"], 10.0);

    assert_eq!(body["tanks"][1]["current_level"], 150.0);
    assert_eq!(body["tanks"][2]["current_level"], 400.0);
    assert_eq!(store.log_count().await, 2);
}

#[tokio::test]
async fn test_commit_partial_failure_is_reported() {
    let store = seeded_store();
    store.inject_write_fault("north").await;
    let app = setup_app(&store, true);

    let body = json_body(json!({"changes": {"north:0": 200, "south:main": 500}}));
    let response = app
        .oneshot(test_request("POST", "/api/bulk/commit", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["report"]["outcome"], "partially_succeeded");
    assert_eq!(body["report"]["branches"][0]["failure"]["tank_id"], "north:0");
    assert!(body["report"]["branches"][1]["failure"].is_null());

    assert_eq!(body["tanks"][0]["current_level"], 100.0);
    assert_eq!(body["tanks"][2]["current_level"], 500.0);
}

#[tokio::test]
async fn test_malformed_tank_id_is_client_error() {
    let app = setup_app(&seeded_store(), true);

    let body = json_body(json!({"changes": {"no-colon": 1}}));
    let response = app
        .oneshot(test_request("POST", "/api/bulk/validate", body))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

// =============================================================================
// CSV Tests
// =============================================================================

#[tokio::test]
async fn test_export_bulk_template() {
    let app = setup_app(&seeded_store(), true);

    let response = app
        .oneshot(test_request("GET", "/api/csv/export?kind=bulk", Body::empty()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    let text = extract_text(response.into_body()).await;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "Branch Name,Oil Type,Current Level (L),Capacity (L),New Level (L),Tank ID"
    );
    assert_eq!(lines[1], "North Depot,Diesel,100,500,100,north:0");
}

#[tokio::test]
async fn test_export_unknown_kind_is_bad_request() {
    let app = setup_app(&seeded_store(), true);

    let response = app
        .oneshot(test_request("GET", "/api/csv/export?kind=pdf", Body::empty()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_export_then_import_round_trip() {
    let store = seeded_store();

    let response = setup_app(&store, true)
        .oneshot(test_request("GET", "/api/csv/export", Body::empty()))
        .await
        .unwrap();
    let csv = extract_text(response.into_body()).await;

    let response = setup_app(&store, true)
        .oneshot(test_request("POST", "/api/csv/import", Body::from(csv)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(
        body["batch"],
        json!({"north:0": 100.0, "north:1": 10.0, "south:main": 950.0})
    );
    assert_eq!(body["violations"], json!([]));
}

#[tokio::test]
async fn test_import_missing_header() {
    let app = setup_app(&seeded_store(), true);

    let csv = "Branch Name,Oil Type,New Level (L)\nNorth Depot,Diesel,5\n";
    let response = app
        .oneshot(test_request("POST", "/api/csv/import", Body::from(csv)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["missing_headers"], json!(["Tank ID"]));
    assert!(body.get("row_errors").is_none());
}

#[tokio::test]
async fn test_import_row_errors() {
    let app = setup_app(&seeded_store(), true);

    let csv = "Branch Name,Oil Type,New Level (L),Tank ID\nNorth Depot,Diesel,900,north:0\n";
    let response = app
        .oneshot(test_request("POST", "/api/csv/import", Body::from(csv)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["row_errors"][0]["line"], 2);
    assert_eq!(body["row_errors"][0]["tank_id"], "north:0");
}
