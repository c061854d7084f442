use super::common::*;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::workflows::classification::domain::{ProjectId, Tier};
use crate::workflows::classification::memory::InMemorySignals;
use crate::workflows::classification::router::{classification_handler, classification_router};
use crate::workflows::classification::service::ClassificationService;

fn json_request(method: &str, uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request")
}

fn get_request(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request")
}

#[tokio::test]
async fn create_then_read_classification() {
    let (service, _, signals) = build_service();
    signals.set_tier(&ProjectId::from("p-600"), Some(Tier::Tier1));
    let router = classification_router(Arc::new(service));

    let created = router
        .clone()
        .oneshot(json_request("POST", "/api/v1/projects", json!({ "id": "p-600" })))
        .await
        .expect("response");
    assert_eq!(created.status(), StatusCode::CREATED);

    let response = router
        .oneshot(get_request("/api/v1/projects/p-600/classification"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json_body(response).await;
    assert_eq!(body["project_id"], "p-600");
    assert_eq!(body["classification"], "active");
    assert_eq!(body["classification_is_auto"], true);
    assert_eq!(body["classification_is_manual"], false);
}

#[tokio::test]
async fn unknown_project_returns_not_found() {
    let (service, _, _) = build_service();
    let router = classification_router(Arc::new(service));

    let response = router
        .oneshot(get_request("/api/v1/projects/ghost/classification/history"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json_body(response).await;
    assert!(body["error"]
        .as_str()
        .expect("error message")
        .contains("ghost"));
}

#[tokio::test]
async fn invalid_override_value_is_unprocessable() {
    let (service, store, signals) = build_service();
    seed_unreconciled(&store, &signals, "p-601", Some(Tier::Tier1), false, false);
    let router = classification_router(Arc::new(service));

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/projects/p-601/classification/override",
            json!({ "value": "archived", "actor": "organiser-7", "reason": "typo" }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn override_then_clear_round_trip() {
    let (service, store, signals) = build_service();
    seed_unreconciled(&store, &signals, "p-602", Some(Tier::Tier1), false, false);
    let router = classification_router(Arc::new(service));

    let pinned = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/projects/p-602/classification/override",
            json!({ "value": "excluded", "actor": "organiser-7", "reason": "board decision" }),
        ))
        .await
        .expect("response");
    assert_eq!(pinned.status(), StatusCode::OK);
    let body = read_json_body(pinned).await;
    assert_eq!(body["new"], "excluded");
    assert_eq!(body["record"]["rule_applied"], "manual_override");

    let cleared = router
        .oneshot(json_request(
            "POST",
            "/api/v1/projects/p-602/classification/override/clear",
            json!({ "actor": "organiser-7" }),
        ))
        .await
        .expect("response");
    assert_eq!(cleared.status(), StatusCode::OK);
    let body = read_json_body(cleared).await;
    assert_eq!(body["current"], "active");
    assert_eq!(body["records"].as_array().expect("records").len(), 2);
}

#[tokio::test]
async fn rollback_without_snapshot_conflicts() {
    let (service, _, _) = build_service();
    let router = classification_router(Arc::new(service));

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/classification/rollback",
            json!({ "confirmed": true, "actor": "admin" }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn reset_without_confirmation_conflicts() {
    let (service, _, _) = build_service();
    let router = classification_router(Arc::new(service));

    let response = router
        .oneshot(json_request("POST", "/api/v1/classification/reset", json!({})))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn retrospective_defaults_to_dry_run() {
    let (service, store, signals) = build_service();
    seed_unreconciled(&store, &signals, "p-603", Some(Tier::Tier1), false, false);
    let router = classification_router(Arc::new(service));

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/classification/retrospective",
            json!({ "actor": "admin" }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["dry_run"], true);
    assert_eq!(body["total_eligible"], 1);
    assert_eq!(body["total_updated"], 0);
    assert_eq!(body["status"], "completed");
}

#[tokio::test]
async fn event_route_reports_ignored_trade_assignment() {
    let (service, store, signals) = build_service();
    seed_unreconciled(&store, &signals, "p-604", Some(Tier::Tier1), false, false);
    let router = classification_router(Arc::new(service));

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/events",
            json!({
                "kind": "contractor_assignment_changed",
                "project_id": "p-604",
                "role": "trade",
                "change": "created"
            }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["routing"], "ignored");
    assert_eq!(body["reason"], "trade_assignment");
}

#[tokio::test]
async fn classification_handler_returns_internal_error_on_repository_failure() {
    let signals = Arc::new(InMemorySignals::new());
    let service = Arc::new(ClassificationService::new(
        Arc::new(UnavailableRepository),
        signals.clone(),
        signals,
        reconcile_config(),
    ));

    let response = classification_handler::<UnavailableRepository, InMemorySignals>(
        State(service),
        Path("p-605".to_string()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
