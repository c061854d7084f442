use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::audit::{ClassificationChangeRecord, PendingChange, RuleApplied};
use super::domain::{ActorId, Classification, ProjectId};
use super::reconciler::{stage_rule_change, Assessment, GuardPolicy, Reconciler};
use super::repository::ProjectRepository;
use super::service::ClassificationError;
use super::signals::SignalProvider;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManualOverrideOutcome {
    pub project_id: ProjectId,
    pub old: Classification,
    pub new: Classification,
    pub record: ClassificationChangeRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClearOverrideOutcome {
    pub project_id: ProjectId,
    pub previous: Classification,
    pub current: Classification,
    pub records: Vec<ClassificationChangeRecord>,
}

/// Explicit pin/unpin of a project's classification. Writes share the reconciler's project
/// locks and atomic commit path.
pub struct ManualOverrides<R, S> {
    reconciler: Arc<Reconciler<R, S>>,
}

impl<R, S> ManualOverrides<R, S>
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    pub fn new(reconciler: Arc<Reconciler<R, S>>) -> Self {
        Self { reconciler }
    }

    /// Pin `value`. A record is written even when the value is unchanged because the pin is
    /// itself the decision being audited.
    pub fn set_manual(
        &self,
        id: &ProjectId,
        value: Classification,
        actor: &ActorId,
        reason: &str,
    ) -> Result<ManualOverrideOutcome, ClassificationError> {
        let pin = || -> Result<ManualOverrideOutcome, ClassificationError> {
            let mut project = self.reconciler.load(id)?;
            let old = project.classification;

            project.classification = value;
            project.automation.pin_manual(reason.to_string());

            let change = PendingChange {
                project_id: id.clone(),
                old_value: old,
                new_value: value,
                reason: reason.to_string(),
                rule_applied: RuleApplied::ManualOverride,
                applied_by: Some(actor.clone()),
                applied_at: Utc::now(),
                was_manual_override: true,
            };

            let mut records = self.reconciler.commit(project, vec![change])?;
            info!(
                project_id = %id,
                old = %old,
                new = %value,
                actor = %actor,
                "classification pinned"
            );

            let record = records
                .pop()
                .ok_or_else(|| missing_audit_record(id))?;

            Ok(ManualOverrideOutcome {
                project_id: id.clone(),
                old,
                new: value,
                record,
            })
        };
        self.reconciler.locks().with_project(id, pin)
    }

    /// Release a pin and converge onto the rule-computed value in the same unit of work.
    pub fn clear_manual(
        &self,
        id: &ProjectId,
        actor: &ActorId,
        reason: &str,
    ) -> Result<ClearOverrideOutcome, ClassificationError> {
        let release = || -> Result<ClearOverrideOutcome, ClassificationError> {
            let mut project = self.reconciler.load(id)?;
            let previous = project.classification;
            let mut changes = Vec::with_capacity(2);

            if project.is_pinned() {
                project.automation.release_manual(reason.to_string());
                changes.push(PendingChange {
                    project_id: id.clone(),
                    old_value: previous,
                    new_value: previous,
                    reason: reason.to_string(),
                    rule_applied: RuleApplied::RemoveManualOverride,
                    applied_by: Some(actor.clone()),
                    applied_at: Utc::now(),
                    was_manual_override: true,
                });
            }

            if let Assessment::Change(evaluation) =
                self.reconciler.assess(&project, GuardPolicy::Force)?
            {
                changes.push(stage_rule_change(&mut project, &evaluation, Some(actor)));
            }

            if changes.is_empty() {
                return Ok(ClearOverrideOutcome {
                    project_id: id.clone(),
                    previous,
                    current: previous,
                    records: Vec::new(),
                });
            }

            let current = project.classification;
            let records = self.reconciler.commit(project, changes)?;
            info!(
                project_id = %id,
                previous = %previous,
                current = %current,
                actor = %actor,
                "manual override cleared"
            );

            Ok(ClearOverrideOutcome {
                project_id: id.clone(),
                previous,
                current,
                records,
            })
        };
        self.reconciler.locks().with_project(id, release)
    }
}

fn missing_audit_record(id: &ProjectId) -> ClassificationError {
    ClassificationError::AuditWrite {
        project_id: id.clone(),
        attempts: 1,
        source: super::repository::RepositoryError::AuditWrite(
            "commit returned no audit record".to_string(),
        ),
    }
}
