use super::domain::{JobSiteId, ProjectId, Tier};
use super::evaluation::SignalSet;

/// Read-only view onto the collaborators that own tier, EBA status, and patch coverage.
///
/// Each lookup returns an already-resolved answer; certification recency and point-in-polygon
/// matching stay with the owning collaborator.
pub trait SignalProvider: Send + Sync {
    fn tier(&self, project: &ProjectId) -> Result<Option<Tier>, SignalError>;
    fn has_certified_eba_primary_contractor(&self, project: &ProjectId)
        -> Result<bool, SignalError>;
    fn has_spatial_patch_assignment(&self, project: &ProjectId) -> Result<bool, SignalError>;
}

/// Maps job sites onto their owning project so patch events can be routed.
pub trait SiteDirectory: Send + Sync {
    fn project_for_site(&self, site: &JobSiteId) -> Result<Option<ProjectId>, SignalError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    #[error("{signal} lookup for {subject} unavailable: {detail}")]
    Unavailable {
        signal: &'static str,
        subject: String,
        detail: String,
    },
}

impl SignalError {
    pub fn unavailable(
        signal: &'static str,
        subject: impl ToString,
        detail: impl Into<String>,
    ) -> Self {
        SignalError::Unavailable {
            signal,
            subject: subject.to_string(),
            detail: detail.into(),
        }
    }
}

/// Resolve every input the evaluator needs. Returns `None` without touching the other
/// collaborators when the tier is unknown.
pub(crate) fn resolve<S>(
    provider: &S,
    project: &ProjectId,
) -> Result<Option<(Tier, SignalSet)>, SignalError>
where
    S: SignalProvider + ?Sized,
{
    let Some(tier) = provider.tier(project)? else {
        return Ok(None);
    };

    let signals = SignalSet {
        has_certified_eba: provider.has_certified_eba_primary_contractor(project)?,
        has_patch: provider.has_spatial_patch_assignment(project)?,
    };

    Ok(Some((tier, signals)))
}
