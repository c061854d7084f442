use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::domain::{ActorId, Classification, ProjectId};
use super::overrides::ManualOverrides;
use super::reconciler::{Assessment, GuardPolicy, ReconcileOutcome, Reconciler};
use super::repository::ProjectRepository;
use super::service::ClassificationError;
use super::signals::SignalProvider;

/// Overall result of a batch. Units that committed stay committed whatever the status.
/// `Cancelled` takes precedence over `PartialFailure`: a cancelled batch reports `Cancelled`
/// even when units failed before the stop, and those failures stay in the report's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Completed,
    PartialFailure,
    Cancelled,
}

impl BatchStatus {
    pub(crate) fn from_parts(cancelled: bool, failures: &[UnitFailure]) -> Self {
        if cancelled {
            BatchStatus::Cancelled
        } else if failures.is_empty() {
            BatchStatus::Completed
        } else {
            BatchStatus::PartialFailure
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFailure {
    pub project_id: ProjectId,
    pub error: String,
}

impl UnitFailure {
    pub(crate) fn new(project_id: &ProjectId, error: &ClassificationError) -> Self {
        Self {
            project_id: project_id.clone(),
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedChange {
    pub project_id: ProjectId,
    pub old: Classification,
    pub new: Classification,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrospectiveReport {
    pub dry_run: bool,
    pub total_scanned: usize,
    pub total_eligible: usize,
    pub total_updated: usize,
    pub changes: Vec<PlannedChange>,
    pub failures: Vec<UnitFailure>,
    pub status: BatchStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkOverrideReport {
    pub requested: usize,
    pub updated: usize,
    pub failures: Vec<UnitFailure>,
    pub status: BatchStatus,
}

/// Runs reconcile and override operations over many projects. Each project is its own
/// transactional unit; no lock is held across the batch.
pub struct BulkOperator<R, S> {
    reconciler: Arc<Reconciler<R, S>>,
    overrides: Arc<ManualOverrides<R, S>>,
}

impl<R, S> BulkOperator<R, S>
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    pub fn new(reconciler: Arc<Reconciler<R, S>>, overrides: Arc<ManualOverrides<R, S>>) -> Self {
        Self {
            reconciler,
            overrides,
        }
    }

    /// Re-evaluate every project. A dry run reports what would change and writes nothing.
    pub fn apply_retrospectively(
        &self,
        dry_run: bool,
        actor: &ActorId,
        cancel: &CancellationToken,
    ) -> Result<RetrospectiveReport, ClassificationError> {
        let projects = self.reconciler.repository().list()?;
        let total_scanned = projects.len();
        let mut total_eligible = 0;
        let mut total_updated = 0;
        let mut changes = Vec::new();
        let mut failures = Vec::new();
        let mut cancelled = false;

        for project in &projects {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let evaluation = match self.reconciler.assess(project, GuardPolicy::RespectOverride) {
                Ok(Assessment::Change(evaluation)) => evaluation,
                Ok(Assessment::Skip(_)) => continue,
                Err(err) => {
                    let err = ClassificationError::from(err);
                    warn!(project_id = %project.id, error = %err, "eligibility check failed");
                    failures.push(UnitFailure::new(&project.id, &err));
                    continue;
                }
            };
            total_eligible += 1;

            if dry_run {
                changes.push(PlannedChange {
                    project_id: project.id.clone(),
                    old: project.classification,
                    new: evaluation.classification,
                    reason: evaluation.change_reason(project.classification),
                });
                continue;
            }

            match self
                .reconciler
                .reconcile_respecting_override(&project.id, Some(actor))
            {
                Ok(ReconcileOutcome::Updated {
                    project_id,
                    old,
                    new,
                    reason,
                }) => {
                    total_updated += 1;
                    changes.push(PlannedChange {
                        project_id,
                        old,
                        new,
                        reason,
                    });
                }
                // Another writer converged the project between the scan and the commit.
                Ok(ReconcileOutcome::Skipped { .. }) => {}
                Err(err) => {
                    warn!(project_id = %project.id, error = %err, "retrospective reconcile failed");
                    failures.push(UnitFailure::new(&project.id, &err));
                }
            }
        }

        let status = BatchStatus::from_parts(cancelled, &failures);
        info!(
            dry_run,
            total_scanned,
            total_eligible,
            total_updated,
            failures = failures.len(),
            ?status,
            "retrospective apply finished"
        );

        Ok(RetrospectiveReport {
            dry_run,
            total_scanned,
            total_eligible,
            total_updated,
            changes,
            failures,
            status,
        })
    }

    pub fn set_manual_bulk(
        &self,
        ids: &[ProjectId],
        value: Classification,
        actor: &ActorId,
        reason: &str,
        cancel: &CancellationToken,
    ) -> BulkOverrideReport {
        let mut updated = 0;
        let mut failures = Vec::new();
        let mut cancelled = false;

        for id in ids {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            match self.overrides.set_manual(id, value, actor, reason) {
                Ok(_) => updated += 1,
                Err(err) => {
                    warn!(project_id = %id, error = %err, "bulk override failed");
                    failures.push(UnitFailure::new(id, &err));
                }
            }
        }

        BulkOverrideReport {
            requested: ids.len(),
            updated,
            status: BatchStatus::from_parts(cancelled, &failures),
            failures,
        }
    }
}
