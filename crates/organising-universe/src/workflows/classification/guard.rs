use super::domain::Project;

/// Decides whether automation may write a project's classification. Value comparison is the
/// reconciler's job; the guard only answers for ownership of the field.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverrideGuard;

impl OverrideGuard {
    pub fn should_reconcile(&self, project: &Project) -> bool {
        !project.automation.is_manual
    }
}
