use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;
use tracing_subscriber::fmt::MakeWriter;

use crate::config::ReconcileConfig;
use crate::workflows::classification::audit::{ClassificationChangeRecord, PendingChange};
use crate::workflows::classification::domain::{
    ActorId, Classification, JobSiteId, NewProject, Project, ProjectId, Tier,
};
use crate::workflows::classification::memory::{InMemoryProjectStore, InMemorySignals};
use crate::workflows::classification::repository::{
    ProjectRepository, RepositoryError, ResetSummary,
};
use crate::workflows::classification::service::ClassificationService;
use crate::workflows::classification::signals::{SignalError, SignalProvider};
use crate::workflows::classification::snapshot::Snapshot;

pub(super) type MemoryService = ClassificationService<InMemoryProjectStore, InMemorySignals>;

pub(super) fn reconcile_config() -> ReconcileConfig {
    ReconcileConfig {
        dispatch_workers: 2,
        audit_retry_attempts: 3,
    }
}

pub(super) fn actor() -> ActorId {
    ActorId::from("organiser-7")
}

pub(super) fn site_of(project: &ProjectId) -> JobSiteId {
    JobSiteId(format!("{project}-site"))
}

pub(super) fn build_service() -> (MemoryService, Arc<InMemoryProjectStore>, Arc<InMemorySignals>) {
    let store = Arc::new(InMemoryProjectStore::new());
    let signals = Arc::new(InMemorySignals::new());
    let service = ClassificationService::new(
        store.clone(),
        signals.clone(),
        signals.clone(),
        reconcile_config(),
    );
    (service, store, signals)
}

/// Publish signals for `id` and insert it with the default classification, leaving
/// reconciliation to the test.
pub(super) fn seed_unreconciled(
    store: &InMemoryProjectStore,
    signals: &InMemorySignals,
    id: &str,
    tier: Option<Tier>,
    eba: bool,
    patch: bool,
) -> ProjectId {
    let project_id = ProjectId::from(id);
    signals.set_tier(&project_id, tier);
    signals.set_certified_eba(&project_id, eba);
    let site = site_of(&project_id);
    signals.register_site(&site, &project_id);
    if patch {
        signals.open_patch(&site);
    }
    store
        .insert(Project::new(project_id.clone(), Classification::Potential))
        .expect("insert project");
    project_id
}

pub(super) fn register<R, S>(service: &ClassificationService<R, S>, id: &ProjectId) -> Project
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    service
        .create_project(NewProject {
            id: id.clone(),
            classification: None,
        })
        .expect("create project")
}

/// Signal provider whose tier lookup starts failing for selected projects after the first
/// call, so a batch scan succeeds and the following reconcile does not.
pub(super) struct FlakySignals {
    pub(super) inner: Arc<InMemorySignals>,
    failing: HashSet<ProjectId>,
    calls: Mutex<HashMap<ProjectId, usize>>,
}

impl FlakySignals {
    pub(super) fn new(inner: Arc<InMemorySignals>, failing: HashSet<ProjectId>) -> Self {
        Self {
            inner,
            failing,
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl SignalProvider for FlakySignals {
    fn tier(&self, project: &ProjectId) -> Result<Option<Tier>, SignalError> {
        let mut calls = self.calls.lock().expect("call mutex poisoned");
        let count = calls.entry(project.clone()).or_default();
        *count += 1;
        if *count > 1 && self.failing.contains(project) {
            return Err(SignalError::unavailable("tier", project, "timeout"));
        }
        drop(calls);
        self.inner.tier(project)
    }

    fn has_certified_eba_primary_contractor(
        &self,
        project: &ProjectId,
    ) -> Result<bool, SignalError> {
        self.inner.has_certified_eba_primary_contractor(project)
    }

    fn has_spatial_patch_assignment(&self, project: &ProjectId) -> Result<bool, SignalError> {
        self.inner.has_spatial_patch_assignment(project)
    }
}

/// Memory store whose next `failures` commits report the audit ledger unavailable.
#[derive(Default)]
pub(super) struct FlakyCommitStore {
    pub(super) inner: InMemoryProjectStore,
    failures: Mutex<u8>,
    pub(super) attempts: Mutex<u8>,
}

impl FlakyCommitStore {
    pub(super) fn failing(failures: u8) -> Self {
        Self {
            failures: Mutex::new(failures),
            ..Self::default()
        }
    }

    pub(super) fn attempts(&self) -> u8 {
        *self.attempts.lock().expect("attempt mutex poisoned")
    }
}

impl ProjectRepository for FlakyCommitStore {
    fn insert(&self, project: Project) -> Result<Project, RepositoryError> {
        self.inner.insert(project)
    }

    fn fetch(&self, id: &ProjectId) -> Result<Option<Project>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn list(&self) -> Result<Vec<Project>, RepositoryError> {
        self.inner.list()
    }

    fn commit(
        &self,
        project: Project,
        changes: Vec<PendingChange>,
    ) -> Result<Vec<ClassificationChangeRecord>, RepositoryError> {
        *self.attempts.lock().expect("attempt mutex poisoned") += 1;
        let mut failures = self.failures.lock().expect("failure mutex poisoned");
        if *failures > 0 {
            *failures -= 1;
            return Err(RepositoryError::AuditWrite("ledger offline".to_string()));
        }
        drop(failures);
        self.inner.commit(project, changes)
    }

    fn history(&self, id: &ProjectId) -> Result<Vec<ClassificationChangeRecord>, RepositoryError> {
        self.inner.history(id)
    }

    fn audit_feed(&self) -> Result<Vec<ClassificationChangeRecord>, RepositoryError> {
        self.inner.audit_feed()
    }

    fn replace_snapshot(&self, snapshot: Snapshot) -> Result<(), RepositoryError> {
        self.inner.replace_snapshot(snapshot)
    }

    fn load_snapshot(&self) -> Result<Option<Snapshot>, RepositoryError> {
        self.inner.load_snapshot()
    }

    fn reset_automation(&self) -> Result<ResetSummary, RepositoryError> {
        self.inner.reset_automation()
    }
}

pub(super) struct UnavailableRepository;

impl ProjectRepository for UnavailableRepository {
    fn insert(&self, _project: Project) -> Result<Project, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &ProjectId) -> Result<Option<Project>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self) -> Result<Vec<Project>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn commit(
        &self,
        _project: Project,
        _changes: Vec<PendingChange>,
    ) -> Result<Vec<ClassificationChangeRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn history(
        &self,
        _id: &ProjectId,
    ) -> Result<Vec<ClassificationChangeRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn audit_feed(&self) -> Result<Vec<ClassificationChangeRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn replace_snapshot(&self, _snapshot: Snapshot) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn load_snapshot(&self) -> Result<Option<Snapshot>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn reset_automation(&self) -> Result<ResetSummary, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// In-memory log sink handed to the engine subscriber.
#[derive(Clone, Default)]
pub(super) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub(super) fn text(&self) -> String {
        let bytes = self.0.lock().expect("log buffer poisoned").clone();
        String::from_utf8(bytes).expect("utf8 log output")
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .expect("log buffer poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
