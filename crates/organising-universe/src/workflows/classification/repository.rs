use serde::Serialize;

use super::audit::{ClassificationChangeRecord, PendingChange};
use super::domain::{Project, ProjectId};
use super::snapshot::Snapshot;

/// Storage abstraction so the engine can be exercised without a database.
///
/// `commit` is the only write path for an existing project: the row and its audit records
/// land together or not at all.
pub trait ProjectRepository: Send + Sync {
    fn insert(&self, project: Project) -> Result<Project, RepositoryError>;
    fn fetch(&self, id: &ProjectId) -> Result<Option<Project>, RepositoryError>;
    fn list(&self) -> Result<Vec<Project>, RepositoryError>;
    fn commit(
        &self,
        project: Project,
        changes: Vec<PendingChange>,
    ) -> Result<Vec<ClassificationChangeRecord>, RepositoryError>;
    fn history(&self, id: &ProjectId) -> Result<Vec<ClassificationChangeRecord>, RepositoryError>;
    fn audit_feed(&self) -> Result<Vec<ClassificationChangeRecord>, RepositoryError>;
    fn replace_snapshot(&self, snapshot: Snapshot) -> Result<(), RepositoryError>;
    fn load_snapshot(&self) -> Result<Option<Snapshot>, RepositoryError>;
    /// Clear every automation flag and purge the audit ledger in one operation.
    fn reset_automation(&self) -> Result<ResetSummary, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("audit append rejected: {0}")]
    AuditWrite(String),
}

impl RepositoryError {
    /// Transient failures worth another commit attempt. Commits are atomic, so a retry can
    /// never duplicate a half-written change.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RepositoryError::Unavailable(_) | RepositoryError::AuditWrite(_)
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub projects_reset: usize,
    pub audit_records_purged: usize,
}
