//! Append-only ledger of classification transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ActorId, Classification, ProjectId};

/// Sequence number assigned by the repository when a record is appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditId(pub u64);

/// Code path that produced a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleApplied {
    TierEbaPatchRules,
    ManualOverride,
    RemoveManualOverride,
    RollbackFunction,
}

impl RuleApplied {
    pub fn label(&self) -> &'static str {
        match self {
            RuleApplied::TierEbaPatchRules => "tier_eba_patch_rules",
            RuleApplied::ManualOverride => "manual_override",
            RuleApplied::RemoveManualOverride => "remove_manual_override",
            RuleApplied::RollbackFunction => "rollback_function",
        }
    }
}

/// Audit entry before the repository assigns its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    pub project_id: ProjectId,
    pub old_value: Classification,
    pub new_value: Classification,
    pub reason: String,
    pub rule_applied: RuleApplied,
    pub applied_by: Option<ActorId>,
    pub applied_at: DateTime<Utc>,
    pub was_manual_override: bool,
}

impl PendingChange {
    pub fn into_record(self, id: AuditId) -> ClassificationChangeRecord {
        ClassificationChangeRecord {
            id,
            project_id: self.project_id,
            old_value: self.old_value,
            new_value: self.new_value,
            reason: self.reason,
            rule_applied: self.rule_applied,
            applied_by: self.applied_by,
            applied_at: self.applied_at,
            was_manual_override: self.was_manual_override,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationChangeRecord {
    pub id: AuditId,
    pub project_id: ProjectId,
    pub old_value: Classification,
    pub new_value: Classification,
    pub reason: String,
    pub rule_applied: RuleApplied,
    pub applied_by: Option<ActorId>,
    pub applied_at: DateTime<Utc>,
    pub was_manual_override: bool,
}

impl ClassificationChangeRecord {
    pub fn changed_value(&self) -> bool {
        self.old_value != self.new_value
    }
}

/// First position where a project's history breaks the `new_value == next.old_value` chain.
pub fn first_chain_break(records: &[ClassificationChangeRecord]) -> Option<usize> {
    records
        .windows(2)
        .position(|pair| pair[0].new_value != pair[1].old_value)
        .map(|index| index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, old: Classification, new: Classification) -> ClassificationChangeRecord {
        PendingChange {
            project_id: ProjectId::from("p-1"),
            old_value: old,
            new_value: new,
            reason: "test".to_string(),
            rule_applied: RuleApplied::TierEbaPatchRules,
            applied_by: None,
            applied_at: Utc::now(),
            was_manual_override: false,
        }
        .into_record(AuditId(id))
    }

    #[test]
    fn chain_break_detected_at_offending_record() {
        use Classification::*;
        let intact = vec![record(1, Potential, Active), record(2, Active, Excluded)];
        assert_eq!(first_chain_break(&intact), None);

        let broken = vec![
            record(1, Potential, Active),
            record(2, Active, Excluded),
            record(3, Potential, Active),
        ];
        assert_eq!(first_chain_break(&broken), Some(2));
    }

    #[test]
    fn rule_applied_serializes_to_stable_tags() {
        let json = serde_json::to_string(&RuleApplied::RemoveManualOverride).expect("serializes");
        assert_eq!(json, format!("\"{}\"", RuleApplied::RemoveManualOverride.label()));
    }
}
