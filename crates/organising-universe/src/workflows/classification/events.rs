//! Domain events published by the collaborators that own the classification inputs, and the
//! router that turns them into reconcile calls.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::domain::{JobSiteId, ProjectId, Tier};
use super::reconciler::{ReconcileOutcome, Reconciler};
use super::repository::ProjectRepository;
use super::service::ClassificationError;
use super::signals::{SignalProvider, SiteDirectory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractorRole {
    Builder,
    HeadContractor,
    Trade,
}

impl ContractorRole {
    /// Only the primary builder role feeds the EBA signal.
    pub fn is_primary(&self) -> bool {
        matches!(self, ContractorRole::Builder | ContractorRole::HeadContractor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentChange {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchChange {
    Opened,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    ContractorAssignmentChanged {
        project_id: ProjectId,
        role: ContractorRole,
        change: AssignmentChange,
    },
    PatchAssignmentChanged {
        job_site_id: JobSiteId,
        change: PatchChange,
    },
    ProjectCreated {
        project_id: ProjectId,
        /// The creator chose the classification, so creation-time rules do not apply.
        #[serde(default)]
        classification_supplied: bool,
    },
    ProjectTierChanged {
        project_id: ProjectId,
        previous: Option<Tier>,
        current: Option<Tier>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    TradeAssignment,
    UnknownSite,
    TierUnchanged,
    ExplicitClassification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "routing", rename_all = "snake_case")]
pub enum RouteOutcome {
    Ignored { reason: IgnoreReason },
    Reconciled { outcome: ReconcileOutcome },
}

/// Resolves each event to the affected project and reconciles it with the override respected.
/// Duplicate deliveries are harmless: the second reconcile finds nothing to change.
pub struct EventRouter<R, S> {
    reconciler: Arc<Reconciler<R, S>>,
    sites: Arc<dyn SiteDirectory>,
}

impl<R, S> EventRouter<R, S>
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    pub fn new(reconciler: Arc<Reconciler<R, S>>, sites: Arc<dyn SiteDirectory>) -> Self {
        Self { reconciler, sites }
    }

    pub fn route(&self, event: &DomainEvent) -> Result<RouteOutcome, ClassificationError> {
        let project_id = match self.affected_project(event)? {
            Ok(project_id) => project_id,
            Err(reason) => {
                debug!(?event, ?reason, "domain event ignored");
                return Ok(RouteOutcome::Ignored { reason });
            }
        };

        let outcome = self
            .reconciler
            .reconcile_respecting_override(&project_id, None)?;
        Ok(RouteOutcome::Reconciled { outcome })
    }

    fn affected_project(
        &self,
        event: &DomainEvent,
    ) -> Result<Result<ProjectId, IgnoreReason>, ClassificationError> {
        let resolved = match event {
            DomainEvent::ContractorAssignmentChanged {
                project_id, role, ..
            } => {
                if role.is_primary() {
                    Ok(project_id.clone())
                } else {
                    Err(IgnoreReason::TradeAssignment)
                }
            }
            DomainEvent::PatchAssignmentChanged { job_site_id, .. } => self
                .sites
                .project_for_site(job_site_id)?
                .ok_or(IgnoreReason::UnknownSite),
            DomainEvent::ProjectCreated {
                project_id,
                classification_supplied,
            } => {
                if *classification_supplied {
                    Err(IgnoreReason::ExplicitClassification)
                } else {
                    Ok(project_id.clone())
                }
            }
            DomainEvent::ProjectTierChanged {
                project_id,
                previous,
                current,
            } => {
                if previous == current {
                    Err(IgnoreReason::TierUnchanged)
                } else {
                    Ok(project_id.clone())
                }
            }
        };

        Ok(resolved)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("event dispatcher has shut down")]
    Closed,
}

/// Fans domain events out over a fixed pool of tokio workers. Ordering across projects is not
/// preserved; per-project exclusivity comes from the reconciler's locks.
pub struct EventDispatcher {
    sender: mpsc::Sender<DomainEvent>,
    workers: Vec<JoinHandle<()>>,
}

impl EventDispatcher {
    pub fn spawn<R, S>(router: Arc<EventRouter<R, S>>, workers: usize, capacity: usize) -> Self
    where
        R: ProjectRepository + 'static,
        S: SignalProvider + 'static,
    {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .map(|worker| {
                let receiver = receiver.clone();
                let router = router.clone();
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(event) = next else {
                            break;
                        };

                        let router = router.clone();
                        let routed =
                            tokio::task::spawn_blocking(move || router.route(&event)).await;
                        match routed {
                            Ok(Ok(outcome)) => debug!(worker, ?outcome, "event routed"),
                            Ok(Err(err)) => warn!(worker, error = %err, "event routing failed"),
                            Err(err) => warn!(worker, error = %err, "event worker panicked"),
                        }
                    }
                })
            })
            .collect();

        Self { sender, workers }
    }

    pub async fn dispatch(&self, event: DomainEvent) -> Result<(), DispatchError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| DispatchError::Closed)
    }

    /// Stop accepting events and wait for queued ones to drain.
    pub async fn shutdown(self) {
        let EventDispatcher { sender, workers } = self;
        drop(sender);
        for worker in workers {
            if let Err(err) = worker.await {
                warn!(error = %err, "event worker exited abnormally");
            }
        }
    }
}
