use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::audit::ClassificationChangeRecord;
use super::bulk::{BulkOperator, BulkOverrideReport, RetrospectiveReport};
use super::domain::{ActorId, Classification, InvalidValue, NewProject, Project, ProjectId};
use super::events::{DomainEvent, EventRouter, RouteOutcome};
use super::overrides::{ClearOverrideOutcome, ManualOverrideOutcome, ManualOverrides};
use super::reconciler::{ReconcileOutcome, Reconciler};
use super::repository::{ProjectRepository, RepositoryError, ResetSummary};
use super::signals::{SignalError, SignalProvider, SiteDirectory};
use super::snapshot::{RollbackReport, SnapshotManager, SnapshotSummary};
use crate::config::ReconcileConfig;

/// Facade composing the reconciler, override API, bulk operator, snapshots, and event router.
pub struct ClassificationService<R, S> {
    reconciler: Arc<Reconciler<R, S>>,
    overrides: Arc<ManualOverrides<R, S>>,
    bulk: BulkOperator<R, S>,
    snapshots: SnapshotManager<R, S>,
    router: Arc<EventRouter<R, S>>,
    batches: CancellationToken,
}

impl<R, S> ClassificationService<R, S>
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    pub fn new(
        repository: Arc<R>,
        signals: Arc<S>,
        sites: Arc<dyn SiteDirectory>,
        config: ReconcileConfig,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(repository, signals, config));
        let overrides = Arc::new(ManualOverrides::new(reconciler.clone()));
        let bulk = BulkOperator::new(reconciler.clone(), overrides.clone());
        let snapshots = SnapshotManager::new(reconciler.clone());
        let router = Arc::new(EventRouter::new(reconciler.clone(), sites));

        Self {
            reconciler,
            overrides,
            bulk,
            snapshots,
            router,
            batches: CancellationToken::new(),
        }
    }

    pub fn reconciler(&self) -> &Arc<Reconciler<R, S>> {
        &self.reconciler
    }

    pub fn event_router(&self) -> Arc<EventRouter<R, S>> {
        self.router.clone()
    }

    /// Token handed to every batch started through the service. Cancelling it stops running
    /// batches at the next unit boundary; a fresh token is not issued afterwards.
    pub fn batch_token(&self) -> CancellationToken {
        self.batches.child_token()
    }

    pub fn cancel_batches(&self) {
        self.batches.cancel();
    }

    pub fn create_project(&self, new_project: NewProject) -> Result<Project, ClassificationError> {
        self.reconciler.create_project(new_project)
    }

    pub fn get(&self, id: &ProjectId) -> Result<Project, ClassificationError> {
        self.reconciler.load(id)
    }

    pub fn projects(&self) -> Result<Vec<Project>, ClassificationError> {
        Ok(self.reconciler.repository().list()?)
    }

    pub fn history(
        &self,
        id: &ProjectId,
    ) -> Result<Vec<ClassificationChangeRecord>, ClassificationError> {
        self.reconciler.load(id)?;
        Ok(self.reconciler.repository().history(id)?)
    }

    pub fn audit_feed(&self) -> Result<Vec<ClassificationChangeRecord>, ClassificationError> {
        Ok(self.reconciler.repository().audit_feed()?)
    }

    pub fn reconcile(
        &self,
        id: &ProjectId,
        actor: Option<&ActorId>,
    ) -> Result<ReconcileOutcome, ClassificationError> {
        self.reconciler.reconcile_respecting_override(id, actor)
    }

    pub fn route_event(&self, event: &DomainEvent) -> Result<RouteOutcome, ClassificationError> {
        self.router.route(event)
    }

    pub fn trigger_retrospective_apply(
        &self,
        dry_run: bool,
        actor: &ActorId,
    ) -> Result<RetrospectiveReport, ClassificationError> {
        self.bulk
            .apply_retrospectively(dry_run, actor, &self.batch_token())
    }

    pub fn set_manual(
        &self,
        id: &ProjectId,
        value: &str,
        actor: &ActorId,
        reason: &str,
    ) -> Result<ManualOverrideOutcome, ClassificationError> {
        let value = Classification::parse(value)?;
        self.overrides.set_manual(id, value, actor, reason)
    }

    pub fn clear_manual(
        &self,
        id: &ProjectId,
        actor: &ActorId,
        reason: &str,
    ) -> Result<ClearOverrideOutcome, ClassificationError> {
        self.overrides.clear_manual(id, actor, reason)
    }

    /// The value is validated once up front; an invalid value touches no project.
    pub fn set_manual_bulk(
        &self,
        ids: &[ProjectId],
        value: &str,
        actor: &ActorId,
        reason: &str,
    ) -> Result<BulkOverrideReport, ClassificationError> {
        let value = Classification::parse(value)?;
        Ok(self
            .bulk
            .set_manual_bulk(ids, value, actor, reason, &self.batch_token()))
    }

    pub fn snapshot(&self) -> Result<SnapshotSummary, ClassificationError> {
        self.snapshots.snapshot()
    }

    pub fn rollback(
        &self,
        confirmed: bool,
        actor: &ActorId,
    ) -> Result<RollbackReport, ClassificationError> {
        self.snapshots
            .rollback(confirmed, actor, &self.batch_token())
    }

    /// Destructive: clears every automation flag and purges the audit ledger.
    pub fn clear_all_automation(
        &self,
        confirmed: bool,
    ) -> Result<ResetSummary, ClassificationError> {
        if !confirmed {
            return Err(ClassificationError::Precondition(
                PreconditionFailure::ResetNotConfirmed,
            ));
        }

        let summary = self.reconciler.repository().reset_automation()?;
        tracing::warn!(
            projects_reset = summary.projects_reset,
            audit_records_purged = summary.audit_records_purged,
            "automation state and audit history cleared"
        );
        Ok(summary)
    }
}

/// Error raised by the classification engine.
#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error(transparent)]
    Validation(#[from] InvalidValue),
    #[error("project {0} not found")]
    NotFound(ProjectId),
    #[error(transparent)]
    Precondition(#[from] PreconditionFailure),
    #[error(transparent)]
    Signal(#[from] SignalError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("audit write failed for project {project_id} after {attempts} attempt(s): {source}")]
    AuditWrite {
        project_id: ProjectId,
        attempts: u8,
        #[source]
        source: RepositoryError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionFailure {
    #[error("rollback requires explicit confirmation")]
    RollbackNotConfirmed,
    #[error("clearing automation requires explicit confirmation")]
    ResetNotConfirmed,
    #[error("no classification snapshot has been taken")]
    NoSnapshot,
}
