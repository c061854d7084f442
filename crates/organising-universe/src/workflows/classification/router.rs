use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ActorId, NewProject, Project, ProjectId};
use super::events::DomainEvent;
use super::repository::{ProjectRepository, RepositoryError};
use super::service::{ClassificationError, ClassificationService};
use super::signals::SignalProvider;

type SharedService<R, S> = Arc<ClassificationService<R, S>>;

/// Router builder exposing the classification read model and administrative operations.
pub fn classification_router<R, S>(service: SharedService<R, S>) -> Router
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    Router::new()
        .route(
            "/api/v1/projects",
            get(list_handler::<R, S>).post(create_handler::<R, S>),
        )
        .route(
            "/api/v1/projects/:project_id/classification",
            get(classification_handler::<R, S>),
        )
        .route(
            "/api/v1/projects/:project_id/classification/history",
            get(history_handler::<R, S>),
        )
        .route(
            "/api/v1/projects/:project_id/classification/override",
            post(set_manual_handler::<R, S>),
        )
        .route(
            "/api/v1/projects/:project_id/classification/override/clear",
            post(clear_manual_handler::<R, S>),
        )
        .route(
            "/api/v1/classification/overrides/bulk",
            post(bulk_override_handler::<R, S>),
        )
        .route(
            "/api/v1/classification/retrospective",
            post(retrospective_handler::<R, S>),
        )
        .route(
            "/api/v1/classification/snapshot",
            post(snapshot_handler::<R, S>),
        )
        .route(
            "/api/v1/classification/rollback",
            post(rollback_handler::<R, S>),
        )
        .route("/api/v1/classification/reset", post(reset_handler::<R, S>))
        .route("/api/v1/classification/audit", get(audit_handler::<R, S>))
        .route("/api/v1/events", post(event_handler::<R, S>))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct SetManualRequest {
    pub(crate) value: String,
    pub(crate) actor: ActorId,
    pub(crate) reason: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClearManualRequest {
    pub(crate) actor: ActorId,
    #[serde(default)]
    pub(crate) reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BulkOverrideRequest {
    pub(crate) project_ids: Vec<ProjectId>,
    pub(crate) value: String,
    pub(crate) actor: ActorId,
    pub(crate) reason: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RetrospectiveRequest {
    #[serde(default = "default_dry_run")]
    pub(crate) dry_run: bool,
    pub(crate) actor: ActorId,
}

fn default_dry_run() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub(crate) struct RollbackRequest {
    #[serde(default)]
    pub(crate) confirmed: bool,
    pub(crate) actor: ActorId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResetRequest {
    #[serde(default)]
    pub(crate) confirmed: bool,
}

pub(crate) async fn create_handler<R, S>(
    State(service): State<SharedService<R, S>>,
    Json(request): Json<NewProject>,
) -> Response
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    match service.create_project(request) {
        Ok(project) => (StatusCode::CREATED, Json(project.view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_handler<R, S>(State(service): State<SharedService<R, S>>) -> Response
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    match service.projects() {
        Ok(projects) => {
            let views: Vec<_> = projects.iter().map(Project::view).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn classification_handler<R, S>(
    State(service): State<SharedService<R, S>>,
    Path(project_id): Path<String>,
) -> Response
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    match service.get(&ProjectId(project_id)) {
        Ok(project) => (StatusCode::OK, Json(project.view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn history_handler<R, S>(
    State(service): State<SharedService<R, S>>,
    Path(project_id): Path<String>,
) -> Response
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    match service.history(&ProjectId(project_id)) {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn set_manual_handler<R, S>(
    State(service): State<SharedService<R, S>>,
    Path(project_id): Path<String>,
    Json(request): Json<SetManualRequest>,
) -> Response
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    let id = ProjectId(project_id);
    match service.set_manual(&id, &request.value, &request.actor, &request.reason) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn clear_manual_handler<R, S>(
    State(service): State<SharedService<R, S>>,
    Path(project_id): Path<String>,
    Json(request): Json<ClearManualRequest>,
) -> Response
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    let id = ProjectId(project_id);
    let reason = request
        .reason
        .unwrap_or_else(|| "manual override removed".to_string());
    match service.clear_manual(&id, &request.actor, &reason) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn bulk_override_handler<R, S>(
    State(service): State<SharedService<R, S>>,
    Json(request): Json<BulkOverrideRequest>,
) -> Response
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    match service.set_manual_bulk(
        &request.project_ids,
        &request.value,
        &request.actor,
        &request.reason,
    ) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn retrospective_handler<R, S>(
    State(service): State<SharedService<R, S>>,
    Json(request): Json<RetrospectiveRequest>,
) -> Response
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    match service.trigger_retrospective_apply(request.dry_run, &request.actor) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn snapshot_handler<R, S>(State(service): State<SharedService<R, S>>) -> Response
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    match service.snapshot() {
        Ok(summary) => (StatusCode::CREATED, Json(summary)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn rollback_handler<R, S>(
    State(service): State<SharedService<R, S>>,
    Json(request): Json<RollbackRequest>,
) -> Response
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    match service.rollback(request.confirmed, &request.actor) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn reset_handler<R, S>(
    State(service): State<SharedService<R, S>>,
    Json(request): Json<ResetRequest>,
) -> Response
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    match service.clear_all_automation(request.confirmed) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn audit_handler<R, S>(State(service): State<SharedService<R, S>>) -> Response
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    match service.audit_feed() {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn event_handler<R, S>(
    State(service): State<SharedService<R, S>>,
    Json(event): Json<DomainEvent>,
) -> Response
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    match service.route_event(&event) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) fn status_for(err: &ClassificationError) -> StatusCode {
    match err {
        ClassificationError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ClassificationError::NotFound(_)
        | ClassificationError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        ClassificationError::Precondition(_)
        | ClassificationError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        ClassificationError::Signal(_) => StatusCode::BAD_GATEWAY,
        ClassificationError::Repository(_) | ClassificationError::AuditWrite { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: ClassificationError) -> Response {
    let status = status_for(&err);
    let payload = json!({ "error": err.to_string() });
    (status, Json(payload)).into_response()
}
