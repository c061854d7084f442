mod rules;

use super::domain::{Classification, Tier};
use serde::{Deserialize, Serialize};

/// Already-resolved collaborator signals for one project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSet {
    pub has_certified_eba: bool,
    pub has_patch: bool,
}

/// Which row of the rule table produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleBasis {
    TierOne,
    EbaWithPatch,
    PatchWithoutEba,
    TierThreeUncovered,
    Default,
}

impl RuleBasis {
    pub fn label(&self) -> &'static str {
        match self {
            RuleBasis::TierOne => "tier 1 rule",
            RuleBasis::EbaWithPatch => "eba and patch rule",
            RuleBasis::PatchWithoutEba => "patch without eba rule",
            RuleBasis::TierThreeUncovered => "uncovered tier 3 rule",
            RuleBasis::Default => "default rule",
        }
    }
}

/// Evaluation output with the inputs that produced it, kept for change reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub tier: Tier,
    pub signals: SignalSet,
    pub classification: Classification,
    pub basis: RuleBasis,
}

impl Evaluation {
    /// Human-readable change reason for a transition away from `previous`.
    pub fn change_reason(&self, previous: Classification) -> String {
        format!(
            "{previous} -> {} via {} ({}, eba {}, patch {})",
            self.classification,
            self.basis.label(),
            self.tier,
            yes_no(self.signals.has_certified_eba),
            yes_no(self.signals.has_patch),
        )
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// Pure classification policy. Callers resolve an unknown tier before reaching this point.
pub fn evaluate(
    tier: Tier,
    has_certified_eba_primary_contractor: bool,
    has_spatial_patch_assignment: bool,
) -> Classification {
    evaluate_with_basis(
        tier,
        SignalSet {
            has_certified_eba: has_certified_eba_primary_contractor,
            has_patch: has_spatial_patch_assignment,
        },
    )
    .classification
}

pub fn evaluate_with_basis(tier: Tier, signals: SignalSet) -> Evaluation {
    let (classification, basis) = rules::apply_rules(tier, signals);
    Evaluation {
        tier,
        signals,
        classification,
        basis,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_is_deterministic() {
        for tier in [Tier::Tier1, Tier::Tier2, Tier::Tier3] {
            for eba in [false, true] {
                for patch in [false, true] {
                    let first = evaluate(tier, eba, patch);
                    for _ in 0..3 {
                        assert_eq!(evaluate(tier, eba, patch), first);
                    }
                }
            }
        }
    }

    #[test]
    fn change_reason_cites_rule_and_inputs() {
        let evaluation = evaluate_with_basis(
            Tier::Tier2,
            SignalSet {
                has_certified_eba: true,
                has_patch: true,
            },
        );
        let reason = evaluation.change_reason(Classification::Potential);
        assert_eq!(
            reason,
            "potential -> active via eba and patch rule (tier_2, eba yes, patch yes)"
        );
    }
}
