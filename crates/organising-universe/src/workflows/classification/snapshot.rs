use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::audit::{PendingChange, RuleApplied};
use super::bulk::{BatchStatus, UnitFailure};
use super::domain::{ActorId, Classification, ProjectId};
use super::reconciler::Reconciler;
use super::repository::ProjectRepository;
use super::service::{ClassificationError, PreconditionFailure};
use super::signals::SignalProvider;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub project_id: ProjectId,
    pub classification: Classification,
}

/// The single retained backup generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub rows: Vec<SnapshotRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SnapshotSummary {
    pub taken_at: DateTime<Utc>,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    pub snapshot_taken_at: DateTime<Utc>,
    pub snapshot_total: usize,
    pub restored: usize,
    /// Projects present in the snapshot that no longer exist.
    pub missing: usize,
    pub failures: Vec<UnitFailure>,
    pub status: BatchStatus,
}

pub struct SnapshotManager<R, S> {
    reconciler: Arc<Reconciler<R, S>>,
}

impl<R, S> SnapshotManager<R, S>
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    pub fn new(reconciler: Arc<Reconciler<R, S>>) -> Self {
        Self { reconciler }
    }

    /// Capture every project's classification, replacing any earlier snapshot.
    pub fn snapshot(&self) -> Result<SnapshotSummary, ClassificationError> {
        let repository = self.reconciler.repository();
        let rows: Vec<SnapshotRow> = repository
            .list()?
            .into_iter()
            .map(|project| SnapshotRow {
                project_id: project.id,
                classification: project.classification,
            })
            .collect();

        let snapshot = Snapshot {
            taken_at: Utc::now(),
            rows,
        };
        let summary = SnapshotSummary {
            taken_at: snapshot.taken_at,
            rows: snapshot.rows.len(),
        };

        repository.replace_snapshot(snapshot)?;
        info!(rows = summary.rows, "classification snapshot captured");
        Ok(summary)
    }

    /// Restore snapshot values on drifted projects and pin them so automation leaves them be.
    pub fn rollback(
        &self,
        confirmed: bool,
        actor: &ActorId,
        cancel: &CancellationToken,
    ) -> Result<RollbackReport, ClassificationError> {
        if !confirmed {
            return Err(PreconditionFailure::RollbackNotConfirmed.into());
        }

        let snapshot = self
            .reconciler
            .repository()
            .load_snapshot()?
            .ok_or(PreconditionFailure::NoSnapshot)?;

        let mut restored = 0;
        let mut missing = 0;
        let mut failures = Vec::new();
        let mut cancelled = false;

        for row in &snapshot.rows {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            match self.restore_row(row, actor, snapshot.taken_at) {
                Ok(RowRestore::Restored) => restored += 1,
                Ok(RowRestore::AlreadyMatching) => {}
                Ok(RowRestore::Missing) => missing += 1,
                Err(err) => {
                    warn!(project_id = %row.project_id, error = %err, "rollback unit failed");
                    failures.push(UnitFailure::new(&row.project_id, &err));
                }
            }
        }

        let status = BatchStatus::from_parts(cancelled, &failures);
        info!(
            restored,
            missing,
            snapshot_total = snapshot.rows.len(),
            ?status,
            "classification rollback finished"
        );

        Ok(RollbackReport {
            snapshot_taken_at: snapshot.taken_at,
            snapshot_total: snapshot.rows.len(),
            restored,
            missing,
            failures,
            status,
        })
    }

    fn restore_row(
        &self,
        row: &SnapshotRow,
        actor: &ActorId,
        taken_at: DateTime<Utc>,
    ) -> Result<RowRestore, ClassificationError> {
        let restore = || -> Result<RowRestore, ClassificationError> {
            let Some(mut project) = self.reconciler.repository().fetch(&row.project_id)? else {
                return Ok(RowRestore::Missing);
            };

            if project.classification == row.classification {
                return Ok(RowRestore::AlreadyMatching);
            }

            let old = project.classification;
            let reason = format!(
                "restored from snapshot taken {}",
                taken_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            project.classification = row.classification;
            project.automation.freeze_restored(reason.clone());

            let change = PendingChange {
                project_id: row.project_id.clone(),
                old_value: old,
                new_value: row.classification,
                reason,
                rule_applied: RuleApplied::RollbackFunction,
                applied_by: Some(actor.clone()),
                applied_at: Utc::now(),
                was_manual_override: false,
            };

            self.reconciler.commit(project, vec![change])?;
            Ok(RowRestore::Restored)
        };
        self.reconciler.locks().with_project(&row.project_id, restore)
    }
}

enum RowRestore {
    Restored,
    AlreadyMatching,
    Missing,
}
