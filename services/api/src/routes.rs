use crate::infra::{AppState, MemoryService};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use organising_universe::workflows::classification::{classification_router, DomainEvent};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

pub(crate) fn with_classification_routes(service: Arc<MemoryService>) -> axum::Router {
    classification_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/events/queue",
            axum::routing::post(queue_event_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Hand an event to the dispatcher pool and return before it is routed.
pub(crate) async fn queue_event_endpoint(
    Extension(state): Extension<AppState>,
    Json(event): Json<DomainEvent>,
) -> impl IntoResponse {
    match state.events.dispatch(event).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "status": "queued" }))),
        Err(err) => {
            warn!(error = %err, "domain event rejected");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": err.to_string() })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{in_memory_service, load_seed, spawn_dispatcher};
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use organising_universe::config::ReconcileConfig;
    use organising_universe::workflows::classification::{
        Classification, JobSiteId, PatchChange, ProjectId,
    };
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn app_state(service: &MemoryService, ready: bool) -> AppState {
        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
            events: Arc::new(spawn_dispatcher(service, 2)),
        }
    }

    #[tokio::test]
    async fn readiness_reports_initializing_until_flagged() {
        let (service, _) = in_memory_service(ReconcileConfig::default());
        let state = app_state(&service, false);
        let router = with_classification_routes(service.clone()).layer(Extension(state));

        let response = router
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn demo_seed_is_served_through_classification_routes() {
        let (service, signals) = in_memory_service(ReconcileConfig::default());
        load_seed(&service, &signals, None).expect("seed");
        let router =
            with_classification_routes(service.clone()).layer(Extension(app_state(&service, true)));

        let response = router
            .oneshot(
                Request::get("/api/v1/projects/riverbank-units/classification")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 4096)
            .await
            .expect("body");
        let payload: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(payload["classification"], "excluded");
    }

    #[tokio::test]
    async fn queued_patch_event_is_reconciled_after_drain() {
        let (service, signals) = in_memory_service(ReconcileConfig::default());
        load_seed(&service, &signals, None).expect("seed");
        let state = app_state(&service, true);
        let router = with_classification_routes(service.clone()).layer(Extension(state.clone()));

        let site = JobSiteId("westgate-hospital-site".to_string());
        signals.close_patch(&site);
        let event = DomainEvent::PatchAssignmentChanged {
            job_site_id: site,
            change: PatchChange::Closed,
        };

        let response = router
            .oneshot(
                Request::post("/api/v1/events/queue")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(&event).expect("encode")))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let AppState { events, .. } = state;
        let dispatcher = Arc::try_unwrap(events).unwrap_or_else(|_| panic!("dispatcher shared"));
        dispatcher.shutdown().await;

        let project = service
            .get(&ProjectId::from("westgate-hospital"))
            .expect("project");
        assert_eq!(project.classification, Classification::Potential);
    }
}
