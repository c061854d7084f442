use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::audit::{ClassificationChangeRecord, PendingChange, RuleApplied};
use super::domain::{ActorId, Classification, NewProject, Project, ProjectId};
use super::evaluation::{evaluate_with_basis, Evaluation};
use super::guard::OverrideGuard;
use super::locks::ProjectLocks;
use super::repository::{ProjectRepository, RepositoryError};
use super::service::ClassificationError;
use super::signals::{self, SignalError, SignalProvider};
use crate::config::ReconcileConfig;

/// Why a reconcile pass left the classification alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    TierUnknown,
    ManualOverride,
    Unchanged,
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::TierUnknown => "no tier",
            SkipReason::ManualOverride => "manual override",
            SkipReason::Unchanged => "no change needed",
        }
    }
}

/// Result of one reconcile call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Updated {
        project_id: ProjectId,
        old: Classification,
        new: Classification,
        reason: String,
    },
    Skipped {
        project_id: ProjectId,
        current: Classification,
        reason: SkipReason,
    },
}

impl ReconcileOutcome {
    pub fn updated(&self) -> bool {
        matches!(self, ReconcileOutcome::Updated { .. })
    }

    pub fn project_id(&self) -> &ProjectId {
        match self {
            ReconcileOutcome::Updated { project_id, .. }
            | ReconcileOutcome::Skipped { project_id, .. } => project_id,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            ReconcileOutcome::Updated { reason, .. } => format!("updated: {reason}"),
            ReconcileOutcome::Skipped { reason, .. } => format!("unchanged: {}", reason.label()),
        }
    }
}

/// What a reconcile pass would do to a project, computed without writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Assessment {
    Skip(SkipReason),
    Change(Evaluation),
}

/// Whether the override guard is consulted. Only `ClearManual` bypasses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GuardPolicy {
    RespectOverride,
    Force,
}

/// Apply an evaluation to an in-memory project and build the matching audit entry.
pub(crate) fn stage_rule_change(
    project: &mut Project,
    evaluation: &Evaluation,
    actor: Option<&ActorId>,
) -> PendingChange {
    let now = Utc::now();
    let old = project.classification;
    let reason = evaluation.change_reason(old);

    project.classification = evaluation.classification;
    project.automation.mark_auto(now, reason.clone());

    PendingChange {
        project_id: project.id.clone(),
        old_value: old,
        new_value: evaluation.classification,
        reason,
        rule_applied: RuleApplied::TierEbaPatchRules,
        applied_by: actor.cloned(),
        applied_at: now,
        was_manual_override: false,
    }
}

/// Converges persisted classifications onto the rule-computed value, one project at a time.
pub struct Reconciler<R, S> {
    repository: Arc<R>,
    signals: Arc<S>,
    locks: ProjectLocks,
    guard: OverrideGuard,
    audit_retry_attempts: u8,
}

impl<R, S> Reconciler<R, S>
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    pub fn new(repository: Arc<R>, signals: Arc<S>, config: ReconcileConfig) -> Self {
        Self {
            repository,
            signals,
            locks: ProjectLocks::new(),
            guard: OverrideGuard,
            audit_retry_attempts: config.audit_retry_attempts.max(1),
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub(crate) fn locks(&self) -> &ProjectLocks {
        &self.locks
    }

    /// Reconcile unless the project is pinned. Event-driven and bulk paths enter here.
    pub fn reconcile_respecting_override(
        &self,
        id: &ProjectId,
        actor: Option<&ActorId>,
    ) -> Result<ReconcileOutcome, ClassificationError> {
        self.locks
            .with_project(id, || self.reconcile_locked(id, actor, GuardPolicy::RespectOverride))
    }

    /// Reconcile even when the project is pinned. The manual flag itself is left alone.
    pub fn force_reconcile(
        &self,
        id: &ProjectId,
        actor: Option<&ActorId>,
    ) -> Result<ReconcileOutcome, ClassificationError> {
        self.locks
            .with_project(id, || self.reconcile_locked(id, actor, GuardPolicy::Force))
    }

    /// Insert a new project, classifying it in the same write when the caller left the
    /// classification open and the tier is already known.
    pub fn create_project(&self, new_project: NewProject) -> Result<Project, ClassificationError> {
        let NewProject { id, classification } = new_project;

        self.locks.with_project(&id, || -> Result<Project, ClassificationError> {
            let project = match classification {
                Some(explicit) => Project::new(id.clone(), explicit),
                None => match signals::resolve(self.signals.as_ref(), &id)? {
                    Some((tier, signal_set)) => {
                        let evaluation = evaluate_with_basis(tier, signal_set);
                        let mut project = Project::new(id.clone(), evaluation.classification);
                        let reason = evaluation.change_reason(Classification::default());
                        project.automation.mark_auto(Utc::now(), reason);
                        project
                    }
                    None => Project::new(id.clone(), Classification::default()),
                },
            };

            let stored = self.repository.insert(project)?;
            info!(
                project_id = %stored.id,
                classification = %stored.classification,
                auto = stored.automation.is_auto,
                "project registered"
            );
            Ok(stored)
        })
    }

    pub(crate) fn load(&self, id: &ProjectId) -> Result<Project, ClassificationError> {
        self.repository
            .fetch(id)?
            .ok_or_else(|| ClassificationError::NotFound(id.clone()))
    }

    /// Decide what reconciliation would do with `project` under `policy`.
    pub(crate) fn assess(
        &self,
        project: &Project,
        policy: GuardPolicy,
    ) -> Result<Assessment, SignalError> {
        let Some((tier, signal_set)) = signals::resolve(self.signals.as_ref(), &project.id)? else {
            return Ok(Assessment::Skip(SkipReason::TierUnknown));
        };

        if policy == GuardPolicy::RespectOverride && !self.guard.should_reconcile(project) {
            return Ok(Assessment::Skip(SkipReason::ManualOverride));
        }

        let evaluation = evaluate_with_basis(tier, signal_set);
        if evaluation.classification == project.classification {
            return Ok(Assessment::Skip(SkipReason::Unchanged));
        }

        Ok(Assessment::Change(evaluation))
    }

    fn reconcile_locked(
        &self,
        id: &ProjectId,
        actor: Option<&ActorId>,
        policy: GuardPolicy,
    ) -> Result<ReconcileOutcome, ClassificationError> {
        let mut project = self.load(id)?;

        let evaluation = match self.assess(&project, policy)? {
            Assessment::Skip(reason) => {
                debug!(project_id = %id, reason = reason.label(), "reconcile skipped");
                return Ok(ReconcileOutcome::Skipped {
                    project_id: id.clone(),
                    current: project.classification,
                    reason,
                });
            }
            Assessment::Change(evaluation) => evaluation,
        };

        let old = project.classification;
        let change = stage_rule_change(&mut project, &evaluation, actor);
        let reason = change.reason.clone();
        self.commit(project, vec![change])?;

        info!(
            project_id = %id,
            old = %old,
            new = %evaluation.classification,
            basis = evaluation.basis.label(),
            "classification reconciled"
        );

        Ok(ReconcileOutcome::Updated {
            project_id: id.clone(),
            old,
            new: evaluation.classification,
            reason,
        })
    }

    /// Persist a project row with its audit records, retrying transient failures. Running out
    /// of attempts is escalated as a critical alert; the caller sees `AuditWrite`.
    pub(crate) fn commit(
        &self,
        project: Project,
        changes: Vec<PendingChange>,
    ) -> Result<Vec<ClassificationChangeRecord>, ClassificationError> {
        let project_id = project.id.clone();
        let mut attempt: u8 = 1;

        loop {
            match self.repository.commit(project.clone(), changes.clone()) {
                Ok(records) => return Ok(records),
                Err(RepositoryError::NotFound) => {
                    return Err(ClassificationError::NotFound(project_id));
                }
                Err(err) if err.is_transient() && attempt < self.audit_retry_attempts => {
                    warn!(
                        project_id = %project_id,
                        attempt,
                        error = %err,
                        "classification commit failed, retrying"
                    );
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    error!(
                        project_id = %project_id,
                        attempts = attempt,
                        error = %err,
                        alert = "critical",
                        "classification change and audit record could not be committed"
                    );
                    return Err(ClassificationError::AuditWrite {
                        project_id,
                        attempts: attempt,
                        source: err,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
