//! Organising universe classification: rule evaluation, override-aware reconciliation, the
//! audit ledger, and the administrative bulk, snapshot, and rollback operations built on them.

pub mod audit;
pub mod bulk;
pub mod domain;
pub mod evaluation;
pub mod events;
pub mod guard;
mod locks;
pub mod memory;
pub mod overrides;
pub mod reconciler;
pub mod repository;
pub mod router;
pub mod seed;
pub mod service;
pub mod signals;
pub mod snapshot;

#[cfg(test)]
mod tests;

pub use audit::{AuditId, ClassificationChangeRecord, RuleApplied};
pub use bulk::{BatchStatus, BulkOverrideReport, PlannedChange, RetrospectiveReport, UnitFailure};
pub use domain::{
    ActorId, AutomationState, Classification, InvalidValue, JobSiteId, NewProject, Project,
    ProjectClassificationView, ProjectId, Tier,
};
pub use evaluation::{evaluate, evaluate_with_basis, Evaluation, RuleBasis, SignalSet};
pub use events::{
    AssignmentChange, ContractorRole, DispatchError, DomainEvent, EventDispatcher, EventRouter,
    IgnoreReason, PatchChange, RouteOutcome,
};
pub use guard::OverrideGuard;
pub use memory::{InMemoryProjectStore, InMemorySignals};
pub use overrides::{ClearOverrideOutcome, ManualOverrideOutcome, ManualOverrides};
pub use reconciler::{ReconcileOutcome, Reconciler, SkipReason};
pub use repository::{ProjectRepository, RepositoryError, ResetSummary};
pub use router::classification_router;
pub use seed::{import_seed, read_seed, read_seed_path, SeedImportError, SeedRow};
pub use service::{ClassificationError, ClassificationService, PreconditionFailure};
pub use signals::{SignalError, SignalProvider, SiteDirectory};
pub use snapshot::{RollbackReport, Snapshot, SnapshotRow, SnapshotSummary};
