//! In-process implementations of the storage and collaborator seams, used by the API service
//! and the test suites.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use super::audit::{AuditId, ClassificationChangeRecord, PendingChange};
use super::domain::{JobSiteId, Project, ProjectId, Tier};
use super::repository::{ProjectRepository, RepositoryError, ResetSummary};
use super::signals::{SignalError, SignalProvider, SiteDirectory};
use super::snapshot::Snapshot;

#[derive(Debug, Default)]
struct StoreState {
    projects: BTreeMap<ProjectId, Project>,
    audit: Vec<ClassificationChangeRecord>,
    next_audit_id: u64,
    snapshot: Option<Snapshot>,
}

/// Project rows, audit ledger, and snapshot behind a single lock, which makes every `commit`
/// atomic.
#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    state: Mutex<StoreState>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("project store lock poisoned".to_string()))
    }
}

impl ProjectRepository for InMemoryProjectStore {
    fn insert(&self, project: Project) -> Result<Project, RepositoryError> {
        let mut state = self.state()?;
        if state.projects.contains_key(&project.id) {
            return Err(RepositoryError::Conflict);
        }
        state.projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    fn fetch(&self, id: &ProjectId) -> Result<Option<Project>, RepositoryError> {
        Ok(self.state()?.projects.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<Project>, RepositoryError> {
        Ok(self.state()?.projects.values().cloned().collect())
    }

    fn commit(
        &self,
        project: Project,
        changes: Vec<PendingChange>,
    ) -> Result<Vec<ClassificationChangeRecord>, RepositoryError> {
        let mut state = self.state()?;
        if !state.projects.contains_key(&project.id) {
            return Err(RepositoryError::NotFound);
        }
        if let Some(stray) = changes.iter().find(|change| change.project_id != project.id) {
            return Err(RepositoryError::AuditWrite(format!(
                "audit record for {} committed with project {}",
                stray.project_id, project.id
            )));
        }

        let mut records = Vec::with_capacity(changes.len());
        for change in changes {
            state.next_audit_id += 1;
            let record = change.into_record(AuditId(state.next_audit_id));
            state.audit.push(record.clone());
            records.push(record);
        }
        state.projects.insert(project.id.clone(), project);

        Ok(records)
    }

    fn history(&self, id: &ProjectId) -> Result<Vec<ClassificationChangeRecord>, RepositoryError> {
        Ok(self
            .state()?
            .audit
            .iter()
            .filter(|record| &record.project_id == id)
            .cloned()
            .collect())
    }

    fn audit_feed(&self) -> Result<Vec<ClassificationChangeRecord>, RepositoryError> {
        Ok(self.state()?.audit.clone())
    }

    fn replace_snapshot(&self, snapshot: Snapshot) -> Result<(), RepositoryError> {
        self.state()?.snapshot = Some(snapshot);
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Option<Snapshot>, RepositoryError> {
        Ok(self.state()?.snapshot.clone())
    }

    fn reset_automation(&self) -> Result<ResetSummary, RepositoryError> {
        let mut state = self.state()?;
        let audit_records_purged = state.audit.len();
        state.audit.clear();

        let mut projects_reset = 0;
        for project in state.projects.values_mut() {
            project.automation.reset();
            projects_reset += 1;
        }

        Ok(ResetSummary {
            projects_reset,
            audit_records_purged,
        })
    }
}

#[derive(Debug, Default)]
struct SignalState {
    tiers: HashMap<ProjectId, Tier>,
    certified_primary: HashSet<ProjectId>,
    sites: HashMap<JobSiteId, ProjectId>,
    open_patches: HashSet<JobSiteId>,
}

/// Mutable stand-in for the tier, EBA, and geospatial collaborators.
#[derive(Debug, Default)]
pub struct InMemorySignals {
    state: RwLock<SignalState>,
}

impl InMemorySignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tier(&self, project: &ProjectId, tier: Option<Tier>) {
        let mut state = self.write();
        match tier {
            Some(tier) => state.tiers.insert(project.clone(), tier),
            None => state.tiers.remove(project),
        };
    }

    pub fn set_certified_eba(&self, project: &ProjectId, certified: bool) {
        let mut state = self.write();
        if certified {
            state.certified_primary.insert(project.clone());
        } else {
            state.certified_primary.remove(project);
        }
    }

    pub fn register_site(&self, site: &JobSiteId, project: &ProjectId) {
        self.write().sites.insert(site.clone(), project.clone());
    }

    pub fn open_patch(&self, site: &JobSiteId) {
        self.write().open_patches.insert(site.clone());
    }

    pub fn close_patch(&self, site: &JobSiteId) {
        self.write().open_patches.remove(site);
    }

    // Setters replace whole entries, so a poisoned lock still holds consistent data.
    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SignalState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(
        &self,
        signal: &'static str,
        subject: &dyn std::fmt::Display,
    ) -> Result<std::sync::RwLockReadGuard<'_, SignalState>, SignalError> {
        self.state
            .read()
            .map_err(|_| SignalError::unavailable(signal, subject, "signal registry poisoned"))
    }
}

impl SignalProvider for InMemorySignals {
    fn tier(&self, project: &ProjectId) -> Result<Option<Tier>, SignalError> {
        Ok(self.read("tier", project)?.tiers.get(project).copied())
    }

    fn has_certified_eba_primary_contractor(
        &self,
        project: &ProjectId,
    ) -> Result<bool, SignalError> {
        Ok(self
            .read("eba", project)?
            .certified_primary
            .contains(project))
    }

    fn has_spatial_patch_assignment(&self, project: &ProjectId) -> Result<bool, SignalError> {
        let state = self.read("patch", project)?;
        Ok(state
            .sites
            .iter()
            .any(|(site, owner)| owner == project && state.open_patches.contains(site)))
    }
}

impl SiteDirectory for InMemorySignals {
    fn project_for_site(&self, site: &JobSiteId) -> Result<Option<ProjectId>, SignalError> {
        Ok(self.read("site", site)?.sites.get(site).cloned())
    }
}
