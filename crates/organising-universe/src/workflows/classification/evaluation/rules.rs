use super::super::domain::{Classification, Tier};
use super::{RuleBasis, SignalSet};

/// Ordered rule table. The first matching row wins.
pub(crate) fn apply_rules(tier: Tier, signals: SignalSet) -> (Classification, RuleBasis) {
    let SignalSet {
        has_certified_eba,
        has_patch,
    } = signals;

    match tier {
        Tier::Tier1 => (Classification::Active, RuleBasis::TierOne),
        Tier::Tier2 | Tier::Tier3 if has_certified_eba && has_patch => {
            (Classification::Active, RuleBasis::EbaWithPatch)
        }
        Tier::Tier2 | Tier::Tier3 if has_patch => {
            (Classification::Potential, RuleBasis::PatchWithoutEba)
        }
        Tier::Tier3 if !has_certified_eba => {
            (Classification::Excluded, RuleBasis::TierThreeUncovered)
        }
        Tier::Tier2 | Tier::Tier3 => (Classification::Potential, RuleBasis::Default),
    }
}
